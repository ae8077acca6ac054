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

//! The `CheckpointLog` component (`§4.7`): deciding, per database log, whether a checkpoint
//! actually touched it, and writing the framed record if so.

pub mod record;

pub use record::{CheckpointLogRecord, DatabaseCheckpointV2, InProgressTxnInfo, SystemCheckpointV1};

use crate::{
    collaborators::LogFile,
    config::Config,
    error::RuntimeResult,
    ids::{DbId, Lsn, Timestamp},
};

/// A single database's checkpoint-worthiness, decided by [`CheckpointLog::should_checkpoint_db`].
pub struct DbCheckpointDecision {
    pub should_write: bool,
    pub should_truncate: bool,
}

/// Appends framed [`CheckpointLogRecord`]s to a [`LogFile`] collaborator and applies the
/// `§4.7` "when to write" / "when to truncate" rules.
pub struct CheckpointLog;

impl CheckpointLog {
    /// `§4.7`'s per-database decision: write a `DatabaseCheckpoint` only if the log was actually
    /// used since the last checkpoint (last modification after `second_most_recent`, or at least
    /// one in-progress transaction). Readonly logs never qualify.
    pub fn should_checkpoint_db(
        log: &dyn LogFile,
        second_most_recent: Timestamp,
        has_in_progress_txn: bool,
    ) -> DbCheckpointDecision {
        if log.is_readonly() {
            return DbCheckpointDecision {
                should_write: false,
                should_truncate: false,
            };
        }
        let used = log.last_modification() > second_most_recent || has_in_progress_txn;
        DbCheckpointDecision {
            should_write: used,
            should_truncate: !used,
        }
    }

    /// write (and, if `truncate` is set, first truncate at `truncate_upto`) a `DatabaseCheckpoint`
    pub fn write_database_checkpoint(
        log: &dyn LogFile,
        cfg: &Config,
        truncate: bool,
        truncate_upto: Lsn,
        record: DatabaseCheckpointV2,
    ) -> RuntimeResult<Lsn> {
        if truncate && cfg.truncate_logical_log {
            log.truncate(truncate_upto)?;
        }
        log.append(&CheckpointLogRecord::DatabaseCheckpoint(record).encode())
    }

    /// write the once-per-checkpoint `SystemCheckpoint` record, truncating first when `§4.7`'s
    /// truncation preconditions (config allows it, checkpoint persisted, nothing outstanding)
    /// all hold.
    pub fn write_system_checkpoint(
        system_log: &dyn LogFile,
        cfg: &Config,
        may_truncate: bool,
        truncate_upto: Lsn,
        record: SystemCheckpointV1,
    ) -> RuntimeResult<Lsn> {
        if may_truncate && cfg.truncate_logical_log {
            system_log.truncate(truncate_upto)?;
        }
        system_log.append(&CheckpointLogRecord::SystemCheckpoint(record).encode())
    }

    pub fn write_sync_begin(log: &dyn LogFile) -> RuntimeResult<Lsn> {
        log.append(&CheckpointLogRecord::FileSynchronizeBegin.encode())
    }

    pub fn write_sync_end(log: &dyn LogFile, modified: bool) -> RuntimeResult<Lsn> {
        log.append(&CheckpointLogRecord::FileSynchronizeEnd { modified }.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FakeLogFile;

    #[test]
    fn readonly_log_never_qualifies() {
        let log = FakeLogFile::new(DbId::new(1));
        log.set_readonly(true);
        let decision = CheckpointLog::should_checkpoint_db(&log, Timestamp::ILLEGAL, true);
        assert!(!decision.should_write);
        assert!(!decision.should_truncate);
    }

    #[test]
    fn unused_log_truncates_instead_of_writing() {
        let log = FakeLogFile::new(DbId::new(1));
        log.set_last_modification(Timestamp::new(5));
        let decision = CheckpointLog::should_checkpoint_db(&log, Timestamp::new(10), false);
        assert!(!decision.should_write);
        assert!(decision.should_truncate);
    }

    #[test]
    fn log_with_in_progress_txn_is_written_even_if_unmodified() {
        let log = FakeLogFile::new(DbId::new(1));
        log.set_last_modification(Timestamp::new(5));
        let decision = CheckpointLog::should_checkpoint_db(&log, Timestamp::new(10), true);
        assert!(decision.should_write);
        assert!(!decision.should_truncate);
    }
}
