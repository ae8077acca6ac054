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

//! `CheckpointManager`: the single owning struct (`§9`'s replacement for the source's global
//! mutable singletons) that wires the three daemons together with the ledger, the availability
//! registry and the external collaborators, and exposes the synchronous `wakeup`/`wait` pair a
//! SQL worker uses to force a checkpoint (`§4.3.3`).

use {
    crate::{
        availability::DatabaseAvailability,
        checkpoint::CheckpointExecutor,
        collaborators::{BufferPoolSet, FileMover, SchemaCatalog, TransactionManager},
        config::{Config, SyncMode},
        daemon::{
            event::ManualResetEvent, Daemon, DaemonControl, DaemonHandle, Disableable, StepOutcome,
        },
        error::{Error, ErrorKind, RuntimeResult},
        flusher::DirtyPageFlusher,
        ids::DbId,
        ledger::TimestampLedger,
        sync::FileSynchronizer,
    },
    parking_lot::Mutex,
    std::{sync::Arc, time::Duration},
};

/// Shared mutual-exclusion state for the executor and synchronizer: exactly one of them may be
/// mid-`step()` at a time, and a SQL worker's `wait()` observes that window via `completion`.
/// Mirrors §4.3.3's "RAII guard inside the daemon...applies uniformly to both executor and
/// synchronizer so either kind of background activity makes `isExecuting()` true".
pub struct RunningGuardState {
    any_running: Mutex<bool>,
    completion: ManualResetEvent,
}

impl RunningGuardState {
    fn new() -> Self {
        Self {
            any_running: Mutex::new(false),
            completion: ManualResetEvent::new(true),
        }
    }

    /// enter a step, failing if one is already in progress elsewhere
    fn try_enter(self: &Arc<Self>) -> Option<RunningGuard> {
        let mut g = self.any_running.lock();
        if *g {
            return None;
        }
        *g = true;
        drop(g);
        self.completion.reset();
        Some(RunningGuard {
            state: self.clone(),
        })
    }
}

struct RunningGuard {
    state: Arc<RunningGuardState>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.state.any_running.lock() = false;
        self.state.completion.set();
    }
}

/// Wraps a `Daemon` so every `step()` is bracketed by a [`RunningGuardState`] guard before
/// delegating to the inner daemon.
struct Tracked<D> {
    inner: D,
    running: Arc<RunningGuardState>,
}

impl<D: Daemon> Daemon for Tracked<D> {
    fn step(&self, ctl: &DaemonControl) -> StepOutcome {
        match self.running.try_enter() {
            Some(_guard) => self.inner.step(ctl),
            None => StepOutcome::Skipped,
        }
    }
}

/// The process-wide checkpoint/recovery core.
pub struct CheckpointManager {
    flusher: DaemonHandle<DirtyPageFlusher>,
    executor: DaemonHandle<Tracked<CheckpointExecutor>>,
    synchronizer: Option<DaemonHandle<Tracked<Arc<FileSynchronizer>>>>,
    ledger: Arc<TimestampLedger>,
    availability: Arc<DatabaseAvailability>,
    running: Arc<RunningGuardState>,
}

impl CheckpointManager {
    /// construct and start the daemon threads described by `cfg`
    pub fn start(
        cfg: Config,
        pools: Arc<dyn BufferPoolSet>,
        catalog: Arc<dyn SchemaCatalog>,
        txns: Arc<dyn TransactionManager>,
        file_mover: Arc<dyn FileMover>,
    ) -> Self {
        let ledger = Arc::new(TimestampLedger::new(cfg.timestamp_table_size));
        let availability = Arc::new(DatabaseAvailability::new());
        let running = Arc::new(RunningGuardState::new());

        let flusher = DaemonHandle::spawn(
            DirtyPageFlusher::new(pools.clone(), cfg.flush_page_coefficient),
            cfg.dirty_page_flusher_period(),
            true,
            "dirty-page-flusher",
        );

        // the executor's `Disableable` is needed by the synchronizer before the executor's own
        // handle exists; `executor_disable` is filled in once the executor is spawned below.
        let executor_disable = Arc::new(LateDisableable::new());
        let synchronizer_daemon = Arc::new(FileSynchronizer::new(
            catalog.clone(),
            availability.clone(),
            executor_disable.clone() as Arc<dyn Disableable>,
            cfg.enable_file_synchronizer,
        ));

        let synchronizer = if cfg.enable_file_synchronizer == SyncMode::Off {
            None
        } else {
            Some(DaemonHandle::spawn(
                Tracked {
                    inner: synchronizer_daemon.clone(),
                    running: running.clone(),
                },
                Duration::from_secs(3600 * 24 * 365),
                false,
                "file-synchronizer",
            ))
        };
        let synchronizer_wake: Arc<dyn crate::daemon::Wakeable> = match &synchronizer {
            Some(h) => h.as_wakeable(),
            None => Arc::new(NullWakeable),
        };

        let executor = DaemonHandle::spawn(
            Tracked {
                inner: CheckpointExecutor::new(
                    pools,
                    catalog,
                    txns,
                    availability.clone(),
                    ledger.clone(),
                    file_mover,
                    vec![flusher.as_disableable()],
                    synchronizer_daemon,
                    synchronizer_wake,
                    cfg.clone(),
                ),
                running: running.clone(),
            },
            cfg.period(),
            true,
            "checkpoint-executor",
        );
        executor_disable.set(executor.as_disableable());

        if cfg.enable_file_synchronizer != SyncMode::Off && cfg.load_synchronize_candidate {
            if let Some(sync_handle) = &synchronizer {
                let _ = sync_handle.daemon().bootstrap_candidates();
                sync_handle.enable(false);
            }
        }

        Self {
            flusher,
            executor,
            synchronizer,
            ledger,
            availability,
            running,
        }
    }

    pub fn ledger(&self) -> &TimestampLedger {
        &self.ledger
    }

    pub fn availability(&self) -> &DatabaseAvailability {
        &self.availability
    }

    /// `§4.3.3`'s worker-facing entry point: request an out-of-band checkpoint. Acquiring the
    /// run guard and running the checkpoint both happen here, synchronously, so two concurrent
    /// callers can never both observe an empty guard — exactly one proceeds, and every other
    /// caller (here or a periodic tick landing mid-pass) sees `RunningCheckpointProcessing`.
    pub fn wakeup(&self) -> RuntimeResult<()> {
        let guard = match self.running.try_enter() {
            Some(guard) => guard,
            None => return Err(Error::from(ErrorKind::RunningCheckpointProcessing)),
        };
        let result = self.executor.daemon().inner.run_global_checkpoint(false);
        drop(guard);
        result
    }

    /// block for up to `timeout` for the most recently requested checkpoint (via `wakeup` or a
    /// periodic tick) to finish.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.running.completion.wait_timeout(timeout)
    }

    /// join the flusher and synchronizer first, the executor last (`§2`'s ordering rule)
    pub fn shutdown(self) -> RuntimeResult<()> {
        self.flusher.join()?;
        if let Some(sync) = self.synchronizer {
            sync.join()?;
        }
        self.executor.join()?;
        Ok(())
    }

    /// drive a global checkpoint synchronously, bypassing the timer and the running-guard.
    /// lets scenario tests assert on a single deterministic pass (`§8.1`).
    #[cfg(any(test, feature = "test-util"))]
    pub fn run_checkpoint_now(&self, aborting: bool) -> RuntimeResult<()> {
        self.executor.daemon().inner.run_global_checkpoint(aborting)
    }

    /// drive a single database's checkpoint synchronously, bypassing the timer.
    #[cfg(any(test, feature = "test-util"))]
    pub fn run_database_checkpoint_now(&self, db: DbId) -> RuntimeResult<()> {
        self.executor.daemon().inner.run_database_checkpoint(db)
    }

    /// drive one file-synchronizer pass synchronously, bypassing the timer.
    #[cfg(any(test, feature = "test-util"))]
    pub fn run_sync_now(&self) -> StepOutcome {
        match &self.synchronizer {
            Some(h) => h.daemon().inner.step(&DaemonControl::for_test(false)),
            None => StepOutcome::Skipped,
        }
    }
}

struct LateDisableable {
    inner: Mutex<Option<Arc<dyn Disableable>>>,
}

impl LateDisableable {
    fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }
    fn set(&self, target: Arc<dyn Disableable>) {
        *self.inner.lock() = Some(target);
    }
}

impl Disableable for LateDisableable {
    fn enable(&self, force: bool) {
        if let Some(t) = self.inner.lock().as_ref() {
            t.enable(force);
        }
    }
    fn disable(&self, force: bool) {
        if let Some(t) = self.inner.lock().as_ref() {
            t.disable(force);
        }
    }
    fn is_enabled(&self) -> bool {
        self.inner.lock().as_ref().map_or(true, |t| t.is_enabled())
    }
    fn is_inactive(&self) -> bool {
        self.inner.lock().as_ref().map_or(true, |t| t.is_inactive())
    }
}

struct NullWakeable;
impl crate::daemon::Wakeable for NullWakeable {
    fn wakeup(&self) {}
}

static MANAGER: std::sync::OnceLock<CheckpointManager> = std::sync::OnceLock::new();

/// install the process-wide manager. Panics if called more than once, mirroring the teacher's
/// `Global` handle in `engine::fractal::mod`.
pub fn init(manager: CheckpointManager) {
    if MANAGER.set(manager).is_err() {
        panic!("checkpoint manager already initialized");
    }
}

pub fn global() -> &'static CheckpointManager {
    MANAGER.get().expect("checkpoint manager not initialized")
}
