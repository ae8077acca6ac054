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

//! Trait boundaries for the subsystems this crate coordinates but does not own: the buffer
//! pool, the schema catalog, the transaction manager and the per-database logical log.
//!
//! `§1` scopes these out as "collaborators"; production wires real implementations in, while
//! [`crate::test_util`] provides fakes for tests.

use crate::{
    error::RuntimeResult,
    ids::{DbId, Lsn, Timestamp, Xid},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Which of a database's two buffer pools a page belongs to.
pub enum PoolCategory {
    /// ordinary data/index pages
    Normal,
    /// pages belonging to the database's logical log
    LogicalLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which dirty pages a flush pass should target.
pub enum FlushFilter {
    /// only pages in a pool whose dirty ratio exceeds the configured coefficient
    AboveThreshold(u8),
    /// every dirty page, regardless of pool occupancy (used when aborting, or at checkpoint time)
    All,
}

/// A single buffer pool's view onto its dirty pages, generalizing the source's
/// `PhysicalFile`/`File` pool distinction into one collaborator boundary.
pub trait BufferPool: Send + Sync {
    fn db(&self) -> DbId;
    fn category(&self) -> PoolCategory;
    /// fraction (0-100) of the pool's capacity currently holding dirty pages
    fn dirty_ratio(&self) -> u8;
    /// write back pages matching `filter`. Returns the count of pages actually flushed.
    fn flush(&self, filter: FlushFilter) -> RuntimeResult<usize>;
}

/// The full set of buffer pools known to the system at a point in time; a snapshot, not a
/// live registry, so a checkpoint step iterates a consistent view even if pools are added
/// concurrently.
pub trait BufferPoolSet: Send + Sync {
    fn pools(&self) -> Vec<Box<dyn BufferPool>>;
    /// flush every dirty page in every pool. Returns `persisted`: true iff every pool's buffer
    /// and disk are now byte-identical (`§4.3.1` step 4) — vacuously true when there was nothing
    /// dirty to begin with, and false only if a pool still reports a nonzero dirty ratio after
    /// the flush attempt (e.g. a page it could not lock).
    fn flush_all_dirty(&self) -> RuntimeResult<bool> {
        let mut persisted = true;
        for pool in self.pools() {
            pool.flush(FlushFilter::All)?;
            if pool.dirty_ratio() > 0 {
                persisted = false;
            }
        }
        Ok(persisted)
    }
}

#[derive(Debug, Clone, Default)]
/// Result of asking a database to synchronize its on-disk state (`§4.4.2`).
pub struct SyncReport {
    /// true if one or more files could not be synchronized (lock contention, I/O failure)
    pub incomplete: bool,
    /// true if synchronizing actually touched anything on disk
    pub modified: bool,
}

/// The schema catalog: which databases exist, and their logs.
pub trait SchemaCatalog: Send + Sync {
    fn databases(&self) -> Vec<DbId>;
    fn exists(&self, db: DbId) -> bool;
    /// the database's own logical-log collaborator, or `None` if it has none registered
    fn log_file(&self, db: DbId) -> Option<Box<dyn LogFile>>;
    /// the system database's log, which every `SystemCheckpoint` record is appended to
    fn system_log(&self) -> Box<dyn LogFile>;
    fn open_database(&self, db: DbId) -> RuntimeResult<()>;
    fn close_database(&self, db: DbId) -> RuntimeResult<()>;
    /// synchronize a single database's on-disk files (`§4.4.2`, `§4.4.3`)
    fn sync_storage(&self, db: DbId) -> RuntimeResult<SyncReport>;
}

#[derive(Debug, Clone, Copy)]
/// A distributed-transaction branch that began before a checkpoint started and is still open.
pub struct InProgressTxn {
    pub begin_lsn: Lsn,
    pub last_lsn: Lsn,
    /// set once the branch has been prepared (two-phase commit); `None` if not yet prepared
    pub prepared_xid: Option<Xid>,
}

/// The transaction manager: everything a checkpoint needs to know about in-flight work.
pub trait TransactionManager: Send + Sync {
    /// transactions with at least one uncommitted logical-log record against `db`, per `§4.3.2`
    /// step 2 (the checkpoint's "oldest still-relevant LSN" calculation)
    fn in_progress_for(&self, db: DbId) -> Vec<InProgressTxn>;
    /// branches whose coordinator timed out and were unilaterally resolved without a final
    /// Commit/Rollback vote (`§3`'s `HeuristicDecision`)
    fn heuristically_completed_branches(&self, db: DbId) -> Vec<(Xid, crate::ids::HeuristicDecision)>;
    /// open a short, read-write, checkpoint-internal transaction (`§4.3.1` step 2)
    fn begin_short_rw(&self, db: DbId) -> RuntimeResult<Timestamp>;
}

/// A single database's logical log.
pub trait LogFile: Send + Sync {
    fn db(&self) -> DbId;
    fn is_readonly(&self) -> bool;
    /// true while some other thread holds the log open for writing
    fn is_in_use(&self) -> bool;
    fn last_modification(&self) -> Timestamp;
    /// append a framed record (see `§4.7.1`) and return its LSN
    fn append(&self, record: &[u8]) -> RuntimeResult<Lsn>;
    /// discard log content before `upto`, if `§6.1`'s `TruncateLogicalLog` allows it
    fn truncate(&self, upto: Lsn) -> RuntimeResult<()>;
    /// record that the file synchronizer has finished with this file as of `at`
    fn mark_synchronize_done(&self, at: Timestamp) -> RuntimeResult<()>;
}

/// Out-of-process cleanup for files that were replaced rather than updated in place
/// (the source's `Checkpoint::FileDestroyer`). Most storage engines have nothing to do here;
/// the default no-op implementation reflects that.
pub trait FileMover: Send + Sync {
    fn purge_pending(&self) -> RuntimeResult<()> {
        Ok(())
    }
}

pub struct NullFileMover;
impl FileMover for NullFileMover {}
