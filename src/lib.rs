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

//! Checkpoint and recovery-coordination core for a relational storage engine.
//!
//! This crate owns three background daemons (the dirty-page flusher, the checkpoint executor
//! and the file synchronizer), the checkpoint log record format, the timestamp ledger that
//! drives recovery's starting point, and the per-database availability registry. Everything it
//! coordinates but does not itself own — buffer pools, the schema catalog, the transaction
//! manager, the logical log — is expressed as a trait in [`collaborators`] so a host storage
//! engine can wire in its real implementations.

pub mod availability;
pub mod checkpoint;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod daemon;
pub mod error;
pub mod flusher;
pub mod ids;
pub mod ledger;
pub mod log;
pub mod manager;
pub mod sync;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use crate::{
    config::Config,
    error::{Error, ErrorKind, RuntimeResult},
    manager::CheckpointManager,
};
