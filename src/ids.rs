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

//! Small `Copy` newtypes shared across the checkpoint core.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// An opaque, monotonically increasing timestamp handed out by the transaction manager.
///
/// [`Timestamp::ILLEGAL`] is a reserved sentinel meaning "no timestamp has been assigned yet".
pub struct Timestamp(u64);

impl Timestamp {
    pub const ILLEGAL: Self = Self(0);
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u64 {
        self.0
    }
    pub const fn is_illegal(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_illegal() {
            write!(f, "<illegal>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identifies a database registered in the schema catalog. `DbId::SYSTEM` names the system
/// database whose log always receives a `SystemCheckpoint` record.
pub struct DbId(u32);

impl DbId {
    pub const SYSTEM: Self = Self(0);
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u32 {
        self.0
    }
    pub const fn is_system(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() {
            write!(f, "system")
        } else {
            write!(f, "db-{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identifies a single file within a database. [`FileId::INVALID`] is stored in a database's
/// `failedFiles` set when the *database itself*, rather than one file within it, is unavailable.
pub struct FileId(u32);

impl FileId {
    pub const INVALID: Self = Self(u32::MAX);
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// A position (log sequence number) within a per-database logical log.
pub struct Lsn(u64);

impl Lsn {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identifies a distributed-transaction branch (the source's `TransactionID`)
pub struct Xid(u128);

impl Xid {
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u128 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
/// The outcome unilaterally chosen for a heuristically completed distributed-transaction branch
pub enum HeuristicDecision {
    Commit = 0,
    Rollback = 1,
}

impl HeuristicDecision {
    pub const fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Commit),
            1 => Some(Self::Rollback),
            _ => None,
        }
    }
}
