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

//! Manual-reset and auto-reset events, each a boolean predicate guarded by a [`Condvar`].
//!
//! This is the redesign of the source's `Os::Event` (manual-reset / wake-up-only-one) into
//! three distinct, independently lockable primitives (see `§9` of the design notes).

use {
    parking_lot::{Condvar, Mutex},
    std::time::Duration,
};

/// An event that, once set, stays set until explicitly reset. Any number of waiters observe it.
pub struct ManualResetEvent {
    state: Mutex<bool>,
    cv: Condvar,
}

impl ManualResetEvent {
    pub fn new(initial: bool) -> Self {
        Self {
            state: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }
    pub fn set(&self) {
        let mut g = self.state.lock();
        if !*g {
            *g = true;
            self.cv.notify_all();
        }
    }
    pub fn reset(&self) {
        *self.state.lock() = false;
    }
    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }
    /// block until the event is set
    pub fn wait(&self) {
        let mut g = self.state.lock();
        while !*g {
            self.cv.wait(&mut g);
        }
    }
    /// block for up to `timeout`; returns whether the event was observed set
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut g = self.state.lock();
        if !*g {
            let result = self.cv.wait_for(&mut g, timeout);
            if result.timed_out() && !*g {
                return false;
            }
        }
        *g
    }
}

/// An event that wakes exactly one waiter and then automatically resets itself.
///
/// A `set()` that arrives with nobody waiting is remembered (the next `wait_timeout` consumes
/// it immediately) because `wakeup()` must be effective even if the daemon thread is between
/// iterations of its loop (it is never actually "missed").
pub struct AutoResetEvent {
    signalled: Mutex<bool>,
    cv: Condvar,
}

impl AutoResetEvent {
    pub fn new(initial: bool) -> Self {
        Self {
            signalled: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }
    /// signal one waiter (or leave a token for the next wait if nobody is currently waiting)
    pub fn set(&self) {
        let mut g = self.signalled.lock();
        *g = true;
        self.cv.notify_one();
    }
    /// block for up to `timeout`, consuming the signal token if one arrives.
    /// Returns `true` if the event was consumed, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut g = self.signalled.lock();
        if !*g {
            let result = self.cv.wait_for(&mut g, timeout);
            if result.timed_out() && !*g {
                return false;
            }
        }
        if *g {
            *g = false;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn manual_reset_stays_set_for_multiple_waiters() {
        let ev = Arc::new(ManualResetEvent::new(false));
        let ev2 = ev.clone();
        let h = thread::spawn(move || {
            ev2.wait();
            true
        });
        thread::sleep(Duration::from_millis(10));
        ev.set();
        assert!(h.join().unwrap());
        assert!(ev.is_set());
        assert!(ev.wait_timeout(Duration::from_millis(5)));
        ev.wait(); // should return immediately, already set
    }

    #[test]
    fn manual_reset_wait_timeout_expires_when_unset() {
        let ev = ManualResetEvent::new(false);
        assert!(!ev.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn auto_reset_times_out_without_signal() {
        let ev = AutoResetEvent::new(false);
        assert!(!ev.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn auto_reset_consumes_single_token() {
        let ev = AutoResetEvent::new(false);
        ev.set();
        assert!(ev.wait_timeout(Duration::from_millis(5)));
        // token consumed; a second wait should time out
        assert!(!ev.wait_timeout(Duration::from_millis(5)));
    }
}
