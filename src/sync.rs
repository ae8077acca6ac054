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

//! `§4.4 FileSynchronizer`: drives each candidate database's storage sync entry point, bracketed
//! by a `FileSynchronizeBegin`/`FileSynchronizeEnd` record pair, and disables the checkpoint
//! executor for the duration of its pass (`§5`'s shared-resource policy).

use {
    crate::{
        availability::DatabaseAvailability,
        collaborators::SchemaCatalog,
        config::SyncMode,
        daemon::{Daemon, DaemonControl, DisableGuard, Disableable, StepOutcome},
        error::RuntimeResult,
        ids::DbId,
        log::CheckpointLog,
    },
    ::log::{error, warn},
    parking_lot::Mutex,
    std::{
        collections::{HashMap, HashSet},
        sync::Arc,
    },
};

pub struct FileSynchronizer {
    catalog: Arc<dyn SchemaCatalog>,
    availability: Arc<DatabaseAvailability>,
    executor: Arc<dyn Disableable>,
    mode: SyncMode,
    candidates: Mutex<HashSet<DbId>>,
    skip_this_round: Mutex<HashMap<DbId, u32>>,
    /// tracks, per database, whether the last checkpoint-log record written to its log was a
    /// `FileSynchronizeEnd` — used to decide whether the next record written makes it a sync
    /// candidate again (`§4.4.1`)
    last_was_sync_end: Mutex<HashMap<DbId, bool>>,
}

impl FileSynchronizer {
    pub fn new(
        catalog: Arc<dyn SchemaCatalog>,
        availability: Arc<DatabaseAvailability>,
        executor: Arc<dyn Disableable>,
        mode: SyncMode,
    ) -> Self {
        Self {
            catalog,
            availability,
            executor,
            mode,
            candidates: Mutex::new(HashSet::new()),
            skip_this_round: Mutex::new(HashMap::new()),
            last_was_sync_end: Mutex::new(HashMap::new()),
        }
    }

    /// `§4.4.1`: on first run, if configured, eagerly open every database's log and seed the
    /// candidate map with it.
    pub fn bootstrap_candidates(&self) -> RuntimeResult<()> {
        for db in self.catalog.databases() {
            self.catalog.open_database(db)?;
            self.register_candidate(db);
        }
        Ok(())
    }

    /// called by the `CheckpointLog` writer whenever a database log receives a record whose
    /// predecessor was not already a sync-end — i.e. the database needs a future sync pass.
    pub fn register_candidate(&self, db: DbId) {
        self.candidates.lock().insert(db);
    }

    /// called by the checkpoint executor just before it writes a `DatabaseCheckpoint` record to
    /// `db`'s log: `§4.4.1` says a database (re-)enters the candidate set the first time such a
    /// record follows something other than a sync-end.
    pub fn note_checkpoint_record_written(&self, db: DbId) {
        let mut last_sync_end = self.last_was_sync_end.lock();
        if !*last_sync_end.get(&db).unwrap_or(&false) {
            self.candidates.lock().insert(db);
        }
        last_sync_end.insert(db, false);
    }

    /// `§4.4.3`'s skip policy: under `SyncMode::Speed`, a database that just received a
    /// `DatabaseCheckpoint` for genuinely modified content skips one subsequent sync pass.
    pub fn note_database_checkpointed(&self, db: DbId, actually_modified: bool) {
        if actually_modified && self.mode == SyncMode::Speed {
            self.skip_this_round.lock().insert(db, 0);
        }
    }

    fn candidate_snapshot(&self) -> Vec<DbId> {
        self.candidates.lock().iter().copied().collect()
    }

    fn sync_one(&self, db: DbId) -> RuntimeResult<()> {
        {
            let mut skip = self.skip_this_round.lock();
            if let Some(count) = skip.get_mut(&db) {
                *count += 1;
                return Ok(());
            }
        }
        // step 2: begin a read-write transaction on the candidate (schema-level locking is a
        // collaborator-internal concern, out of scope per §1)
        let log = if db.is_system() {
            self.catalog.system_log()
        } else {
            if !self.availability.is_available(db) {
                // step 5: unavailable databases are simply skipped
                return Ok(());
            }
            match self.catalog.log_file(db) {
                Some(log) => log,
                None => return Ok(()),
            }
        };
        if log.is_readonly() {
            return Ok(());
        }
        CheckpointLog::write_sync_begin(log.as_ref())?;
        let report = self.catalog.sync_storage(db)?;
        CheckpointLog::write_sync_end(log.as_ref(), report.modified)?;
        self.last_was_sync_end.lock().insert(db, true);
        if !report.incomplete {
            log.mark_synchronize_done(log.last_modification())?;
            // a full, complete synchronization pass is the only way to leave the candidate set
            self.candidates.lock().remove(&db);
        } else {
            // step 4's "incomplete" path: leave the candidate registered for the next pass
            self.register_candidate(db);
        }
        Ok(())
    }
}

impl Daemon for FileSynchronizer {
    fn step(&self, ctl: &DaemonControl) -> StepOutcome {
        let _guard = DisableGuard::new(self.executor.clone(), false);
        for db in self.candidate_snapshot() {
            if ctl.is_aborting() {
                // still honor the begin/end record invariant for whatever candidate is mid-flight;
                // remaining candidates are simply deferred to the next pass
                break;
            }
            if let Err(e) = self.sync_one(db) {
                warn!("file synchronizer: sync of database {db} failed: {e}");
            }
        }
        self.skip_this_round.lock().clear();
        if ctl.is_aborting() {
            StepOutcome::Aborted
        } else {
            StepOutcome::Ran
        }
    }
}

impl Drop for FileSynchronizer {
    fn drop(&mut self) {
        if !self.skip_this_round.lock().is_empty() {
            error!("file synchronizer dropped with a non-empty skip list");
        }
    }
}

/// Trivial `Disableable`/`Wakeable` stand-ins used where a test needs to wire a
/// `CheckpointExecutor` or `FileSynchronizer` but isn't exercising cross-daemon control itself.
#[cfg(any(test, feature = "test-util"))]
pub mod tests_support {
    use crate::daemon::{Disableable, Wakeable};

    pub struct NullDisableable;
    impl Disableable for NullDisableable {
        fn enable(&self, _force: bool) {}
        fn disable(&self, _force: bool) {}
        fn is_enabled(&self) -> bool {
            true
        }
        fn is_inactive(&self) -> bool {
            true
        }
    }

    pub struct NullWakeable;
    impl Wakeable for NullWakeable {
        fn wakeup(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::SyncReport,
        sync::tests_support::NullDisableable,
        test_util::{FakeSchemaCatalog, FakeLogFile},
    };

    #[test]
    fn candidate_gets_begin_and_end_records() {
        let catalog = Arc::new(FakeSchemaCatalog::new());
        let log = catalog.register(DbId::new(1));
        catalog.set_sync_report(DbId::new(1), SyncReport { incomplete: false, modified: true });
        let availability = Arc::new(DatabaseAvailability::new());

        let sync = FileSynchronizer::new(
            catalog.clone(),
            availability,
            Arc::new(NullDisableable),
            SyncMode::Speed,
        );
        sync.register_candidate(DbId::new(1));
        let ctl = DaemonControl::for_test(false);
        assert_eq!(sync.step(&ctl), StepOutcome::Ran);

        let records = log.decode_all().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn skip_this_round_suppresses_one_pass() {
        let catalog = Arc::new(FakeSchemaCatalog::new());
        let log = catalog.register(DbId::new(2));
        catalog.set_sync_report(DbId::new(2), SyncReport { incomplete: false, modified: true });
        let availability = Arc::new(DatabaseAvailability::new());
        let sync = FileSynchronizer::new(
            catalog.clone(),
            availability,
            Arc::new(NullDisableable),
            SyncMode::Speed,
        );
        sync.register_candidate(DbId::new(2));
        sync.note_database_checkpointed(DbId::new(2), true);

        let ctl = DaemonControl::for_test(false);
        sync.step(&ctl); // skipped this pass
        assert!(log.decode_all().unwrap().is_empty());

        sync.step(&ctl); // runs this time
        assert_eq!(log.decode_all().unwrap().len(), 2);
    }

    #[test]
    fn unavailable_database_is_skipped() {
        let catalog = Arc::new(FakeSchemaCatalog::new());
        let log = catalog.register(DbId::new(3));
        let availability = Arc::new(DatabaseAvailability::new());
        availability.set_unavailable(DbId::new(3));
        let sync = FileSynchronizer::new(
            catalog,
            availability,
            Arc::new(NullDisableable),
            SyncMode::Speed,
        );
        sync.register_candidate(DbId::new(3));
        let ctl = DaemonControl::for_test(false);
        sync.step(&ctl);
        assert!(log.decode_all().unwrap().is_empty());
    }

    #[test]
    fn readonly_log_is_skipped() {
        let catalog = Arc::new(FakeSchemaCatalog::new());
        let log: Arc<FakeLogFile> = catalog.register(DbId::new(4));
        log.set_readonly(true);
        let availability = Arc::new(DatabaseAvailability::new());
        let sync = FileSynchronizer::new(
            catalog,
            availability,
            Arc::new(NullDisableable),
            SyncMode::Speed,
        );
        sync.register_candidate(DbId::new(4));
        let ctl = DaemonControl::for_test(false);
        sync.step(&ctl);
        assert!(log.decode_all().unwrap().is_empty());
    }
}
