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

//! The base "daemon thread" abstraction: a long-lived worker that periodically runs a
//! user-defined [`Daemon::step`], can be nested-enabled/disabled, and can be woken early.
//!
//! See `§4.1` for the full state machine this implements.

pub mod event;

use {
    self::event::{AutoResetEvent, ManualResetEvent},
    crate::error::{Error, ErrorKind, RuntimeResult},
    std::{
        sync::Arc,
        thread::{self, JoinHandle},
        time::Duration,
    },
    parking_lot::Mutex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    NotStarted,
    Running,
    Aborting,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What a single [`Daemon::step`] invocation actually did. This is the redesign of the
/// source's exception-driven cancellation signal into an explicit return value (`§9`).
pub enum StepOutcome {
    /// the step ran to completion
    Ran,
    /// the daemon was disabled and `force` was not set, so the step did not run
    Skipped,
    /// the step observed that the daemon is aborting and wound down early
    Aborted,
}

/// The value `Daemon::step` is handed each invocation: whether the daemon's owning thread has
/// been asked to abort, so long-running steps (the flusher, the synchronizer) can change their
/// behavior (flush everything; still close a begin/end pair) rather than being killed outright.
#[derive(Debug, Clone, Copy)]
pub struct DaemonControl {
    aborting: bool,
}

impl DaemonControl {
    pub fn is_aborting(&self) -> bool {
        self.aborting
    }
    /// construct a control value directly, for components' own unit tests that drive `step()`
    /// without going through a live [`DaemonHandle`].
    #[cfg(any(test, feature = "test-util"))]
    pub fn for_test(aborting: bool) -> Self {
        Self { aborting }
    }
}

/// Implemented by the periodic action a [`DaemonHandle`] runs on its dedicated thread.
pub trait Daemon: Send + Sync + 'static {
    fn step(&self, ctl: &DaemonControl) -> StepOutcome;
}

impl<T: Daemon + ?Sized> Daemon for Arc<T> {
    fn step(&self, ctl: &DaemonControl) -> StepOutcome {
        T::step(self, ctl)
    }
}

/// Something whose run permission can be nested-enabled/disabled, independent of what kind of
/// daemon it is. Lets the checkpoint executor hold a handle to the dirty-page flusher (and vice
/// versa for the synchronizer) without depending on each other's concrete `Daemon` type.
pub trait Disableable: Send + Sync {
    fn enable(&self, force: bool);
    fn disable(&self, force: bool);
    fn is_enabled(&self) -> bool;
    fn is_inactive(&self) -> bool;
}

/// Something that can be woken early, independent of what kind of daemon it is.
pub trait Wakeable: Send + Sync {
    fn wakeup(&self);
}

/// An RAII guard returned by [`Disableable::disable`]-style helpers that re-enables on drop.
/// Mirrors the "disable the buffer-pool daemons; restore on unwind" step of `§4.3.1`.
pub struct DisableGuard {
    target: Arc<dyn Disableable>,
    force: bool,
}

impl DisableGuard {
    pub fn new(target: Arc<dyn Disableable>, force: bool) -> Self {
        target.disable(force);
        Self { target, force }
    }
}

impl Drop for DisableGuard {
    fn drop(&mut self) {
        self.target.enable(self.force);
    }
}

struct DaemonCore<D> {
    latch: Mutex<i32>,
    status: Mutex<DaemonStatus>,
    enable_event: ManualResetEvent,
    wakeup_event: AutoResetEvent,
    inactive_event: ManualResetEvent,
    interval: Duration,
    daemon: D,
    #[allow(dead_code)]
    name: &'static str,
}

impl<D: Daemon> DaemonCore<D> {
    fn status(&self) -> DaemonStatus {
        *self.status.lock()
    }
    fn set_status(&self, s: DaemonStatus) {
        *self.status.lock() = s;
    }
    fn enable(&self, force: bool) {
        let mut count = self.latch.lock();
        if force {
            *count = 1;
        } else {
            *count += 1;
        }
        if *count > 0 {
            self.enable_event.set();
        }
    }
    fn disable(&self, force: bool) {
        {
            let mut count = self.latch.lock();
            if force {
                *count = 0;
            } else {
                *count -= 1;
            }
            if *count <= 0 {
                self.enable_event.reset();
            }
        }
        // invariant #7: disable does not return while step() is running
        self.inactive_event.wait();
    }
    fn is_enabled(&self) -> bool {
        *self.latch.lock() > 0
    }
    fn is_inactive(&self) -> bool {
        self.inactive_event.is_set()
    }
    /// run `step()` once, honoring the enabled/disabled latch. In `force` mode, blocks until
    /// enabled rather than skipping (used by the main loop, per `§4.1`'s step protocol).
    fn execute(&self, force: bool) -> StepOutcome {
        loop {
            if self.is_enabled() {
                break;
            }
            if !force {
                return StepOutcome::Skipped;
            }
            self.enable_event.wait();
        }
        self.inactive_event.reset();
        let ctl = DaemonControl {
            aborting: self.status() == DaemonStatus::Aborting,
        };
        let outcome = self.daemon.step(&ctl);
        self.inactive_event.set();
        outcome
    }
}

impl<D: Daemon> Disableable for DaemonCore<D> {
    fn enable(&self, force: bool) {
        DaemonCore::enable(self, force)
    }
    fn disable(&self, force: bool) {
        DaemonCore::disable(self, force)
    }
    fn is_enabled(&self) -> bool {
        DaemonCore::is_enabled(self)
    }
    fn is_inactive(&self) -> bool {
        DaemonCore::is_inactive(self)
    }
}

impl<D: Daemon> Wakeable for DaemonCore<D> {
    fn wakeup(&self) {
        self.wakeup_event.set();
    }
}

fn run_loop<D: Daemon>(core: Arc<DaemonCore<D>>) {
    loop {
        core.wakeup_event.wait_timeout(core.interval);
        if core.status() == DaemonStatus::Aborting {
            break;
        }
        core.execute(true);
    }
    core.set_status(DaemonStatus::Aborted);
}

/// Owns a `Daemon`'s dedicated OS thread plus its enable/wakeup/inactive state.
pub struct DaemonHandle<D: Daemon> {
    core: Arc<DaemonCore<D>>,
    thread: Option<JoinHandle<()>>,
}

impl<D: Daemon> DaemonHandle<D> {
    /// create and start a daemon thread. `enabled` sets the initial nested-enable depth (0 or 1).
    pub fn spawn(daemon: D, interval: Duration, enabled: bool, name: &'static str) -> Self {
        let core = Arc::new(DaemonCore {
            latch: Mutex::new(enabled as i32),
            status: Mutex::new(DaemonStatus::Running),
            enable_event: ManualResetEvent::new(enabled),
            wakeup_event: AutoResetEvent::new(false),
            inactive_event: ManualResetEvent::new(true),
            interval,
            daemon,
            name,
        });
        let thread_core = core.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(thread_core))
            .expect("failed to spawn daemon thread");
        Self {
            core,
            thread: Some(thread),
        }
    }
    pub fn daemon(&self) -> &D {
        &self.core.daemon
    }
    pub fn wakeup(&self) {
        self.core.wakeup_event.set();
    }
    pub fn enable(&self, force: bool) {
        self.core.enable(force)
    }
    pub fn disable(&self, force: bool) {
        self.core.disable(force)
    }
    pub fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }
    pub fn is_inactive(&self) -> bool {
        self.core.is_inactive()
    }
    /// drive `step()` directly, bypassing the timer. Used by the synchronous checkpoint path and
    /// by tests that need deterministic scenarios instead of waiting on real timers.
    pub fn execute_now(&self, force: bool) -> StepOutcome {
        self.core.execute(force)
    }
    /// a type-erased handle usable to disable/enable this daemon without naming its `Daemon` type
    pub fn as_disableable(&self) -> Arc<dyn Disableable> {
        self.core.clone() as Arc<dyn Disableable>
    }
    /// a type-erased handle usable to wake this daemon without naming its `Daemon` type
    pub fn as_wakeable(&self) -> Arc<dyn Wakeable> {
        self.core.clone() as Arc<dyn Wakeable>
    }
    /// signal abort, force-enable (so a disabled daemon can still reach the abort check), wake
    /// the thread, and block for it to exit (`§4.1`'s join protocol).
    pub fn join(mut self) -> RuntimeResult<()> {
        {
            let mut status = self.core.status.lock();
            if *status == DaemonStatus::Running {
                *status = DaemonStatus::Aborting;
            }
        }
        self.core.wakeup_event.set();
        self.core.enable(true);
        if let Some(t) = self.thread.take() {
            t.join().map_err(|_| {
                Error::from(ErrorKind::Foreign(
                    "daemon thread panicked while aborting".into(),
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDaemon(Arc<AtomicUsize>);
    impl Daemon for CountingDaemon {
        fn step(&self, _ctl: &DaemonControl) -> StepOutcome {
            self.0.fetch_add(1, Ordering::SeqCst);
            StepOutcome::Ran
        }
    }

    #[test]
    fn disable_enable_idempotence() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = DaemonHandle::spawn(
            CountingDaemon(counter.clone()),
            Duration::from_secs(3600),
            true,
            "test-daemon",
        );
        handle.disable(false);
        handle.disable(false);
        handle.enable(false);
        handle.enable(false);
        assert!(handle.is_enabled());
        handle.join().unwrap();
    }

    #[test]
    fn disable_waits_for_inflight_step() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = DaemonHandle::spawn(
            CountingDaemon(counter.clone()),
            Duration::from_millis(10),
            true,
            "test-daemon-2",
        );
        // give the loop a chance to run a step, then disable: disable must not observe a torn step
        std::thread::sleep(Duration::from_millis(30));
        handle.disable(false);
        assert!(!handle.is_enabled());
        assert!(handle.is_inactive());
        handle.join().unwrap();
    }

    #[test]
    fn execute_now_runs_step_directly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = DaemonHandle::spawn(
            CountingDaemon(counter.clone()),
            Duration::from_secs(3600),
            false,
            "test-daemon-3",
        );
        assert_eq!(handle.execute_now(false), StepOutcome::Skipped);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        handle.enable(false);
        assert_eq!(handle.execute_now(false), StepOutcome::Ran);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        handle.join().unwrap();
    }

    #[test]
    fn disable_guard_restores_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        let handle = DaemonHandle::spawn(
            CountingDaemon(counter.clone()),
            Duration::from_secs(3600),
            true,
            "test-daemon-4",
        );
        {
            let _guard = DisableGuard::new(handle.as_disableable(), false);
            assert!(!handle.is_enabled());
        }
        assert!(handle.is_enabled());
        handle.join().unwrap();
    }
}
