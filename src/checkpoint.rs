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

//! `§4.3 CheckpointExecutor`: runs the global and per-database checkpoint algorithms, the core
//! of this crate.

use {
    crate::{
        availability::DatabaseAvailability,
        collaborators::{BufferPoolSet, FileMover, SchemaCatalog, TransactionManager},
        config::Config,
        daemon::{Daemon, DaemonControl, DisableGuard, Disableable, StepOutcome, Wakeable},
        error::RuntimeResult,
        ids::{DbId, Timestamp},
        ledger::TimestampLedger,
        log::{CheckpointLog, DatabaseCheckpointV2, InProgressTxnInfo, SystemCheckpointV1},
        sync::FileSynchronizer,
    },
    ::log::{error, info},
    std::sync::Arc,
};

pub struct CheckpointExecutor {
    pools: Arc<dyn BufferPoolSet>,
    catalog: Arc<dyn SchemaCatalog>,
    txns: Arc<dyn TransactionManager>,
    availability: Arc<DatabaseAvailability>,
    ledger: Arc<TimestampLedger>,
    file_mover: Arc<dyn FileMover>,
    buffer_daemons: Vec<Arc<dyn Disableable>>,
    synchronizer: Arc<FileSynchronizer>,
    synchronizer_wake: Arc<dyn Wakeable>,
    cfg: Config,
}

impl CheckpointExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pools: Arc<dyn BufferPoolSet>,
        catalog: Arc<dyn SchemaCatalog>,
        txns: Arc<dyn TransactionManager>,
        availability: Arc<DatabaseAvailability>,
        ledger: Arc<TimestampLedger>,
        file_mover: Arc<dyn FileMover>,
        buffer_daemons: Vec<Arc<dyn Disableable>>,
        synchronizer: Arc<FileSynchronizer>,
        synchronizer_wake: Arc<dyn Wakeable>,
        cfg: Config,
    ) -> Self {
        Self {
            pools,
            catalog,
            txns,
            availability,
            ledger,
            file_mover,
            buffer_daemons,
            synchronizer,
            synchronizer_wake,
            cfg,
        }
    }

    /// `§4.3.1`: one global checkpoint. `aborting` skips sync-candidate enumeration and forces a
    /// full buffer flush.
    pub fn run_global_checkpoint(&self, aborting: bool) -> RuntimeResult<()> {
        // step 1: disable all buffer-pool daemons, nested, restored on unwind
        let _guards: Vec<DisableGuard> = self
            .buffer_daemons
            .iter()
            .map(|d| DisableGuard::new(d.clone(), false))
            .collect();

        // step 2: sync-candidate (re-)registration happens per database inside
        // `write_checkpoint_records`, triggered by the `DatabaseCheckpoint` record it writes
        // (`§4.4.1`), not by a scan here.

        // step 3: begin a short rw transaction on the system database
        self.txns.begin_short_rw(DbId::SYSTEM)?;

        // step 4: flush everything still dirty since the last checkpoint. This is already a full
        // flush regardless of `aborting` (it forces the same full pass this already performs);
        // `persisted` is true iff no pool reports remaining dirty pages afterward.
        let persisted = self.pools.flush_all_dirty()?;

        // step 5: file-destroyer / file-mover purges
        self.file_mover.purge_pending()?;

        // step 6: fill in recoveryStart for unavailable databases, forget stale entries
        self.availability
            .set_start_recovery_time(&self.ledger, self.catalog.as_ref());

        // step 7: commit (modeled implicitly — the transaction collaborator has no explicit
        // commit primitive in this crate's scope, per §1)

        // step 8: obtain a fresh timestamp and assign it, non-synchronized
        let finish = self.txns.begin_short_rw(DbId::SYSTEM)?;
        self.ledger.assign_global(finish, false);

        // step 9: write CheckpointLog records
        self.write_checkpoint_records(finish, persisted, aborting)?;

        // step 10: if persisted, re-assign finish a second time, synchronized, collapsing
        // secondMostRecent onto mostRecent
        if persisted {
            self.ledger.assign_global(finish, true);
        }

        // step 11: buffer-daemon disable unwinds when `_guards` drops

        info!("global checkpoint finished at {finish} (persisted={persisted})");
        self.synchronizer_wake.wakeup();
        Ok(())
    }

    fn write_checkpoint_records(
        &self,
        finish: Timestamp,
        persisted: bool,
        aborting: bool,
    ) -> RuntimeResult<()> {
        let mut any_unavailable = !self.availability.unavailable_snapshot().is_empty();
        let mut any_in_progress_anywhere = false;
        let mut any_heuristic_branches = false;

        for db in self.catalog.databases() {
            if db.is_system() {
                continue;
            }
            if !self.availability.is_available(db) {
                any_unavailable = true;
                continue;
            }
            let log = match self.catalog.log_file(db) {
                Some(log) => log,
                None => continue,
            };
            let in_progress = self.txns.in_progress_for(db);
            if !in_progress.is_empty() {
                any_in_progress_anywhere = true;
            }
            let heuristics = self.txns.heuristically_completed_branches(db);
            if !heuristics.is_empty() {
                any_heuristic_branches = true;
            }
            let second_most_recent = self.ledger.db_second_most_recent(db);
            let decision =
                CheckpointLog::should_checkpoint_db(log.as_ref(), second_most_recent, !in_progress.is_empty());
            if decision.should_truncate {
                if self.cfg.truncate_logical_log {
                    log.truncate(crate::ids::Lsn::new(0))?;
                }
                continue;
            }
            if !decision.should_write {
                continue;
            }
            let in_progress_info: Vec<InProgressTxnInfo> = in_progress
                .into_iter()
                .map(|t| InProgressTxnInfo {
                    xid: t.prepared_xid.unwrap_or(crate::ids::Xid::new(0)),
                    begin_lsn: t.begin_lsn,
                    last_lsn: t.last_lsn,
                    heuristic: heuristics
                        .iter()
                        .find(|(xid, _)| Some(*xid) == t.prepared_xid)
                        .map(|(_, decision)| *decision),
                })
                .collect();
            let oldest_relevant_lsn = in_progress_info
                .iter()
                .map(|t| t.begin_lsn)
                .min()
                .unwrap_or(crate::ids::Lsn::new(0));
            let actually_modified = log.last_modification() > second_most_recent;
            let previous_ts = self.ledger.db_most_recent(db);
            self.synchronizer.note_checkpoint_record_written(db);
            CheckpointLog::write_database_checkpoint(
                log.as_ref(),
                &self.cfg,
                false,
                crate::ids::Lsn::new(0),
                DatabaseCheckpointV2 {
                    db,
                    timestamp: finish,
                    previous_ts,
                    terminated: aborting,
                    oldest_relevant_lsn,
                    in_progress: in_progress_info,
                    synchronized: persisted,
                },
            )?;
            self.ledger.assign_db(db, finish, false);
            self.synchronizer
                .note_database_checkpointed(db, actually_modified);
        }

        let may_truncate_system = self.cfg.truncate_logical_log
            && !any_in_progress_anywhere
            && !any_unavailable
            && !any_heuristic_branches
            && persisted;
        let unavailable_databases: Vec<(DbId, Timestamp)> = self
            .availability
            .unavailable_snapshot()
            .into_iter()
            .map(|(db, _)| (db, self.availability.recovery_start(db).unwrap_or(Timestamp::ILLEGAL)))
            .collect();
        let heuristically_completed_branches: Vec<_> = self
            .catalog
            .databases()
            .into_iter()
            .flat_map(|db| self.txns.heuristically_completed_branches(db))
            .collect();
        let previous_ts = self.ledger.global_second_most_recent();
        CheckpointLog::write_system_checkpoint(
            self.catalog.system_log().as_ref(),
            &self.cfg,
            may_truncate_system,
            crate::ids::Lsn::new(0),
            SystemCheckpointV1 {
                timestamp: finish,
                previous_ts,
                synchronized: persisted,
                terminated: aborting,
                meta_unavailable: false,
                unavailable_databases,
                heuristically_completed_branches,
            },
        )?;
        Ok(())
    }

    /// `§4.3.2`: a single database's checkpoint, used when it must be independently quiesced.
    pub fn run_database_checkpoint(&self, db: DbId) -> RuntimeResult<()> {
        let _guards: Vec<DisableGuard> = self
            .buffer_daemons
            .iter()
            .map(|d| DisableGuard::new(d.clone(), false))
            .collect();

        let result = (|| -> RuntimeResult<()> {
            let log = self
                .catalog
                .log_file(db)
                .ok_or_else(|| crate::error::Error::from(crate::error::ErrorKind::MissingSchemaObject))?;
            for pool in self.pools.pools() {
                if pool.db() == db {
                    pool.flush(crate::collaborators::FlushFilter::All)?;
                }
            }
            let finish = self.txns.begin_short_rw(db)?;
            let previous_ts = self.ledger.db_most_recent(db);
            self.ledger.assign_db(db, finish, true);
            CheckpointLog::write_database_checkpoint(
                log.as_ref(),
                &self.cfg,
                false,
                crate::ids::Lsn::new(0),
                DatabaseCheckpointV2 {
                    db,
                    timestamp: finish,
                    previous_ts,
                    terminated: false,
                    oldest_relevant_lsn: crate::ids::Lsn::new(0),
                    in_progress: Vec::new(),
                    synchronized: true,
                },
            )?;
            Ok(())
        })();

        if let Err(ref e) = result {
            error!("per-database checkpoint of {db} failed: {e}");
            self.availability.set_unavailable(db);
        }
        result
    }
}

impl Daemon for CheckpointExecutor {
    fn step(&self, ctl: &DaemonControl) -> StepOutcome {
        match self.run_global_checkpoint(ctl.is_aborting()) {
            Ok(()) => {
                if ctl.is_aborting() {
                    StepOutcome::Aborted
                } else {
                    StepOutcome::Ran
                }
            }
            Err(e) => {
                error!("global checkpoint failed: {e}");
                StepOutcome::Ran
            }
        }
    }
}
