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

//! Thread-local diagnostic context, attached to errors as they cross subsystem boundaries.

use core::{cell::RefCell, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which subsystem an error originated in
pub enum Subsystem {
    Daemon,
    Flusher,
    Checkpoint,
    Sync,
    Ledger,
    Availability,
    Log,
    Config,
}

impl Subsystem {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daemon => "daemon error",
            Self::Flusher => "flusher error",
            Self::Checkpoint => "checkpoint error",
            Self::Sync => "synchronizer error",
            Self::Ledger => "ledger error",
            Self::Availability => "availability error",
            Self::Log => "checkpoint log error",
            Self::Config => "config error",
        }
    }
}

#[derive(Clone)]
/// A diagnostic message: either owned or a static string, to avoid allocating on the hot path
pub enum Dmsg {
    Owned(Box<str>),
    Static(&'static str),
}

impl AsRef<str> for Dmsg {
    fn as_ref(&self) -> &str {
        match self {
            Self::Owned(s) => s,
            Self::Static(s) => s,
        }
    }
}

impl PartialEq for Dmsg {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl fmt::Display for Dmsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl fmt::Debug for Dmsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        <str as fmt::Debug>::fmt(self.as_ref(), f)
    }
}

impl From<String> for Dmsg {
    fn from(s: String) -> Self {
        Self::Owned(s.into_boxed_str())
    }
}

impl From<&'static str> for Dmsg {
    fn from(s: &'static str) -> Self {
        Self::Static(s)
    }
}

struct LocalContext {
    origin: Option<Subsystem>,
    dmsg: Option<Dmsg>,
}

impl LocalContext {
    const fn null() -> Self {
        Self {
            origin: None,
            dmsg: None,
        }
    }
}

thread_local! {
    static CTX: RefCell<LocalContext> = const { RefCell::new(LocalContext::null()) };
}

/// Set the origin for the current thread's local context
pub fn set_origin(origin: Subsystem) {
    CTX.with(|ctx| ctx.borrow_mut().origin = Some(origin));
}

/// Set the dmsg for the current thread's local context
pub fn set_dmsg(dmsg: impl Into<Dmsg>) {
    CTX.with(|ctx| ctx.borrow_mut().dmsg = Some(dmsg.into()));
}

/// Take (and clear) the origin from the current thread's local context
pub fn pop_origin() -> Option<Subsystem> {
    CTX.with(|ctx| ctx.borrow_mut().origin.take())
}

/// Take (and clear) the dmsg from the current thread's local context
pub fn pop_dmsg() -> Option<Dmsg> {
    CTX.with(|ctx| ctx.borrow_mut().dmsg.take())
}

/// Read the origin without clearing it
pub fn get_origin() -> Option<Subsystem> {
    CTX.with(|ctx| ctx.borrow().origin)
}
