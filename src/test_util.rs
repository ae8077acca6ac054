/*
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! In-memory fakes for the collaborator traits (`§1`), used by this crate's own unit tests and
//! exposed to integration tests under the `test-util` feature.

use {
    crate::{
        collaborators::{
            BufferPool, BufferPoolSet, FlushFilter, InProgressTxn, LogFile, PoolCategory,
            SchemaCatalog, SyncReport, TransactionManager,
        },
        error::{Error, ErrorKind, RuntimeResult},
        ids::{DbId, HeuristicDecision, Lsn, Timestamp, Xid},
    },
    parking_lot::Mutex,
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
    },
};

/// An in-memory log file, behind a mutex, with a monotonic LSN counter.
pub struct FakeLogFile {
    db: DbId,
    readonly: Mutex<bool>,
    in_use: Mutex<bool>,
    last_modification: Mutex<Timestamp>,
    next_lsn: AtomicU64,
    records: Mutex<Vec<u8>>,
    truncated_upto: Mutex<Option<Lsn>>,
    fail_appends: Mutex<bool>,
}

impl FakeLogFile {
    pub fn new(db: DbId) -> Self {
        Self {
            db,
            readonly: Mutex::new(false),
            in_use: Mutex::new(false),
            last_modification: Mutex::new(Timestamp::ILLEGAL),
            next_lsn: AtomicU64::new(1),
            records: Mutex::new(Vec::new()),
            truncated_upto: Mutex::new(None),
            fail_appends: Mutex::new(false),
        }
    }
    pub fn set_readonly(&self, v: bool) {
        *self.readonly.lock() = v;
    }
    pub fn set_in_use(&self, v: bool) {
        *self.in_use.lock() = v;
    }
    pub fn set_last_modification(&self, ts: Timestamp) {
        *self.last_modification.lock() = ts;
    }
    pub fn set_fail_appends(&self, v: bool) {
        *self.fail_appends.lock() = v;
    }
    pub fn truncated_upto(&self) -> Option<Lsn> {
        *self.truncated_upto.lock()
    }
    /// every framed record appended so far, concatenated in order
    pub fn raw_bytes(&self) -> Vec<u8> {
        self.records.lock().clone()
    }
    /// decode every record appended so far
    pub fn decode_all(&self) -> RuntimeResult<Vec<crate::log::CheckpointLogRecord>> {
        let bytes = self.records.lock();
        let mut out = Vec::new();
        let mut at = 0usize;
        while at < bytes.len() {
            let (rec, consumed) = crate::log::CheckpointLogRecord::decode(&bytes[at..])?;
            at += consumed;
            out.push(rec);
        }
        Ok(out)
    }
}

impl LogFile for FakeLogFile {
    fn db(&self) -> DbId {
        self.db
    }
    fn is_readonly(&self) -> bool {
        *self.readonly.lock()
    }
    fn is_in_use(&self) -> bool {
        *self.in_use.lock()
    }
    fn last_modification(&self) -> Timestamp {
        *self.last_modification.lock()
    }
    fn append(&self, record: &[u8]) -> RuntimeResult<Lsn> {
        if *self.fail_appends.lock() {
            return Err(Error::from(ErrorKind::Collaborator(
                "fake log file configured to fail appends".into(),
            )));
        }
        self.records.lock().extend_from_slice(record);
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        Ok(Lsn::new(lsn))
    }
    fn truncate(&self, upto: Lsn) -> RuntimeResult<()> {
        *self.truncated_upto.lock() = Some(upto);
        Ok(())
    }
    fn mark_synchronize_done(&self, at: Timestamp) -> RuntimeResult<()> {
        *self.last_modification.lock() = at;
        Ok(())
    }
}

/// An in-memory buffer pool whose dirty ratio and page count are set directly by tests.
pub struct FakeBufferPool {
    db: DbId,
    category: PoolCategory,
    dirty_ratio: Mutex<u8>,
    dirty_pages: Mutex<usize>,
    fail_flush: Mutex<bool>,
    /// when set, `flush` reports pages written but leaves the pool's dirty ratio unchanged,
    /// simulating a pool that could not fully clear (e.g. a page it could not lock) without
    /// raising an error. Lets tests exercise the `persisted=false` path of `§4.3.1` step 4.
    stays_dirty: Mutex<bool>,
}

impl FakeBufferPool {
    pub fn new(db: DbId, category: PoolCategory) -> Self {
        Self {
            db,
            category,
            dirty_ratio: Mutex::new(0),
            dirty_pages: Mutex::new(0),
            fail_flush: Mutex::new(false),
            stays_dirty: Mutex::new(false),
        }
    }
    pub fn set_dirty(&self, ratio: u8, pages: usize) {
        *self.dirty_ratio.lock() = ratio;
        *self.dirty_pages.lock() = pages;
    }
    pub fn set_fail_flush(&self, v: bool) {
        *self.fail_flush.lock() = v;
    }
    pub fn set_stays_dirty(&self, v: bool) {
        *self.stays_dirty.lock() = v;
    }
}

impl BufferPool for FakeBufferPool {
    fn db(&self) -> DbId {
        self.db
    }
    fn category(&self) -> PoolCategory {
        self.category
    }
    fn dirty_ratio(&self) -> u8 {
        *self.dirty_ratio.lock()
    }
    fn flush(&self, filter: FlushFilter) -> RuntimeResult<usize> {
        if *self.fail_flush.lock() {
            return Err(Error::from(ErrorKind::Collaborator(
                "fake buffer pool configured to fail flush".into(),
            )));
        }
        let qualifies = match filter {
            FlushFilter::All => true,
            FlushFilter::AboveThreshold(t) => self.dirty_ratio() >= t,
        };
        if !qualifies {
            return Ok(0);
        }
        let mut pages = self.dirty_pages.lock();
        let flushed = *pages;
        if !*self.stays_dirty.lock() {
            *pages = 0;
            *self.dirty_ratio.lock() = 0;
        }
        Ok(flushed)
    }
}

/// A fixed set of [`FakeBufferPool`]s, handed out as a snapshot.
#[derive(Default)]
pub struct FakeBufferPoolSet {
    pools: Mutex<Vec<Arc<FakeBufferPool>>>,
}

impl FakeBufferPoolSet {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&self, pool: Arc<FakeBufferPool>) {
        self.pools.lock().push(pool);
    }
}

impl BufferPoolSet for FakeBufferPoolSet {
    fn pools(&self) -> Vec<Box<dyn BufferPool>> {
        self.pools
            .lock()
            .iter()
            .cloned()
            .map(|p| Box::new(ArcBufferPool(p)) as Box<dyn BufferPool>)
            .collect()
    }
}

struct ArcBufferPool(Arc<FakeBufferPool>);
impl BufferPool for ArcBufferPool {
    fn db(&self) -> DbId {
        self.0.db()
    }
    fn category(&self) -> PoolCategory {
        self.0.category()
    }
    fn dirty_ratio(&self) -> u8 {
        self.0.dirty_ratio()
    }
    fn flush(&self, filter: FlushFilter) -> RuntimeResult<usize> {
        self.0.flush(filter)
    }
}

/// A schema catalog over an in-memory set of databases and their [`FakeLogFile`]s.
#[derive(Default)]
pub struct FakeSchemaCatalog {
    databases: Mutex<HashMap<DbId, Arc<FakeLogFile>>>,
    system_log: Arc<FakeLogFile>,
    sync_reports: Mutex<HashMap<DbId, SyncReport>>,
}

impl FakeSchemaCatalog {
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            system_log: Arc::new(FakeLogFile::new(DbId::SYSTEM)),
            sync_reports: Mutex::new(HashMap::new()),
        }
    }
    pub fn register(&self, db: DbId) -> Arc<FakeLogFile> {
        let log = Arc::new(FakeLogFile::new(db));
        self.databases.lock().insert(db, log.clone());
        log
    }
    pub fn system_log_fake(&self) -> Arc<FakeLogFile> {
        self.system_log.clone()
    }
    pub fn unregister(&self, db: DbId) {
        self.databases.lock().remove(&db);
    }
    pub fn set_sync_report(&self, db: DbId, report: SyncReport) {
        self.sync_reports.lock().insert(db, report);
    }
}

struct ArcLogFile(Arc<FakeLogFile>);
impl LogFile for ArcLogFile {
    fn db(&self) -> DbId {
        self.0.db()
    }
    fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }
    fn is_in_use(&self) -> bool {
        self.0.is_in_use()
    }
    fn last_modification(&self) -> Timestamp {
        self.0.last_modification()
    }
    fn append(&self, record: &[u8]) -> RuntimeResult<Lsn> {
        self.0.append(record)
    }
    fn truncate(&self, upto: Lsn) -> RuntimeResult<()> {
        self.0.truncate(upto)
    }
    fn mark_synchronize_done(&self, at: Timestamp) -> RuntimeResult<()> {
        self.0.mark_synchronize_done(at)
    }
}

impl SchemaCatalog for FakeSchemaCatalog {
    fn databases(&self) -> Vec<DbId> {
        self.databases.lock().keys().copied().collect()
    }
    fn exists(&self, db: DbId) -> bool {
        self.databases.lock().contains_key(&db)
    }
    fn log_file(&self, db: DbId) -> Option<Box<dyn LogFile>> {
        self.databases
            .lock()
            .get(&db)
            .cloned()
            .map(|l| Box::new(ArcLogFile(l)) as Box<dyn LogFile>)
    }
    fn system_log(&self) -> Box<dyn LogFile> {
        Box::new(ArcLogFile(self.system_log.clone()))
    }
    fn open_database(&self, db: DbId) -> RuntimeResult<()> {
        self.register(db);
        Ok(())
    }
    fn close_database(&self, db: DbId) -> RuntimeResult<()> {
        self.unregister(db);
        Ok(())
    }
    fn sync_storage(&self, db: DbId) -> RuntimeResult<SyncReport> {
        Ok(self
            .sync_reports
            .lock()
            .get(&db)
            .cloned()
            .unwrap_or_default())
    }
}

/// A transaction manager over an in-memory table of in-progress branches.
#[derive(Default)]
pub struct FakeTransactionManager {
    in_progress: Mutex<HashMap<DbId, Vec<InProgressTxn>>>,
    heuristic: Mutex<HashMap<DbId, Vec<(Xid, HeuristicDecision)>>>,
    next_ts: AtomicU64,
}

impl FakeTransactionManager {
    pub fn new() -> Self {
        Self {
            in_progress: Mutex::new(HashMap::new()),
            heuristic: Mutex::new(HashMap::new()),
            next_ts: AtomicU64::new(1),
        }
    }
    pub fn add_in_progress(&self, db: DbId, txn: InProgressTxn) {
        self.in_progress.lock().entry(db).or_default().push(txn);
    }
    pub fn add_heuristic(&self, db: DbId, xid: Xid, decision: HeuristicDecision) {
        self.heuristic
            .lock()
            .entry(db)
            .or_default()
            .push((xid, decision));
    }
}

impl TransactionManager for FakeTransactionManager {
    fn in_progress_for(&self, db: DbId) -> Vec<InProgressTxn> {
        self.in_progress.lock().get(&db).cloned().unwrap_or_default()
    }
    fn heuristically_completed_branches(&self, db: DbId) -> Vec<(Xid, HeuristicDecision)> {
        self.heuristic.lock().get(&db).cloned().unwrap_or_default()
    }
    fn begin_short_rw(&self, _db: DbId) -> RuntimeResult<Timestamp> {
        Ok(Timestamp::new(self.next_ts.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Bundles a full set of fakes so scenario tests can wire a [`crate::manager::CheckpointManager`]
/// with one call.
pub struct Harness {
    pub pools: Arc<FakeBufferPoolSet>,
    pub catalog: Arc<FakeSchemaCatalog>,
    pub txns: Arc<FakeTransactionManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            pools: Arc::new(FakeBufferPoolSet::new()),
            catalog: Arc::new(FakeSchemaCatalog::new()),
            txns: Arc::new(FakeTransactionManager::new()),
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
