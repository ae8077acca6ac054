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

//! `§4.6 DatabaseAvailability`: the registry of databases (and individual files within them)
//! that recovery has quarantined, and that the checkpoint executor must skip over.

use {
    crate::{
        collaborators::SchemaCatalog,
        ids::{DbId, FileId, Timestamp},
    },
    parking_lot::Mutex,
    std::collections::{HashMap, HashSet},
};

#[derive(Debug, Clone, Default)]
struct AvailabilityEntry {
    /// when recovery for this database started; filled in lazily at checkpoint time if unset
    recovery_start: Option<Timestamp>,
    /// files within the database known to be unavailable. `FileId::INVALID` marks the whole
    /// database unavailable rather than one file within it.
    failed_files: HashSet<FileId>,
}

impl AvailabilityEntry {
    fn is_db_unavailable(&self) -> bool {
        self.failed_files.contains(&FileId::INVALID)
    }
}

/// Registry of databases/files quarantined by recovery.
pub struct DatabaseAvailability {
    entries: Mutex<HashMap<DbId, AvailabilityEntry>>,
}

impl DatabaseAvailability {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// mark the whole database unavailable
    pub fn set_unavailable(&self, db: DbId) {
        let mut entries = self.entries.lock();
        entries
            .entry(db)
            .or_default()
            .failed_files
            .insert(FileId::INVALID);
    }

    /// mark the whole database (and every file within it) available again
    pub fn set_available(&self, db: DbId) {
        self.entries.lock().remove(&db);
    }

    /// mark a single file within `db` unavailable/available. Marking a file available never
    /// implies the database itself becomes available; marking it unavailable never implies the
    /// whole database is unavailable (file-level implies nothing about db-level, the reverse does).
    pub fn set_file_availability(&self, db: DbId, file: FileId, available: bool) {
        let mut entries = self.entries.lock();
        let entry = entries.entry(db).or_default();
        if available {
            entry.failed_files.remove(&file);
        } else {
            entry.failed_files.insert(file);
        }
    }

    /// db-level availability: unavailable iff the database itself (not just some file in it)
    /// was marked unavailable
    pub fn is_available(&self, db: DbId) -> bool {
        match self.entries.lock().get(&db) {
            None => true,
            Some(e) => !e.is_db_unavailable(),
        }
    }

    /// file-level availability: unavailable if either the whole database or this specific file
    /// was marked unavailable
    pub fn is_file_available(&self, db: DbId, file: FileId) -> bool {
        match self.entries.lock().get(&db) {
            None => true,
            Some(e) => !e.is_db_unavailable() && !e.failed_files.contains(&file),
        }
    }

    /// snapshot of every unavailable database and its failed files, for inclusion in a
    /// `SystemCheckpoint` record
    pub fn unavailable_snapshot(&self) -> Vec<(DbId, Vec<FileId>)> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.failed_files.is_empty())
            .map(|(db, e)| (*db, e.failed_files.iter().copied().collect()))
            .collect()
    }

    /// `§4.6`'s checkpoint-time sweep: fill in any missing `recoveryStart` from the ledger's
    /// `secondMostRecent` for that database, and drop entries for databases no longer in the
    /// schema catalog.
    pub fn set_start_recovery_time(
        &self,
        ledger: &crate::ledger::TimestampLedger,
        catalog: &dyn SchemaCatalog,
    ) {
        let mut entries = self.entries.lock();
        entries.retain(|db, _| catalog.exists(*db));
        for (db, entry) in entries.iter_mut() {
            if entry.recovery_start.is_none() {
                entry.recovery_start = Some(ledger.db_second_most_recent(*db));
            }
        }
    }

    pub fn recovery_start(&self, db: DbId) -> Option<Timestamp> {
        self.entries.lock().get(&db).and_then(|e| e.recovery_start)
    }
}

impl Default for DatabaseAvailability {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FakeSchemaCatalog;

    #[test]
    fn db_level_unavailability_implies_file_level() {
        let avail = DatabaseAvailability::new();
        let db = DbId::new(1);
        avail.set_unavailable(db);
        assert!(!avail.is_available(db));
        assert!(!avail.is_file_available(db, FileId::new(5)));
    }

    #[test]
    fn file_level_unavailability_does_not_imply_db_level() {
        let avail = DatabaseAvailability::new();
        let db = DbId::new(1);
        avail.set_file_availability(db, FileId::new(5), false);
        assert!(avail.is_available(db));
        assert!(!avail.is_file_available(db, FileId::new(5)));
        assert!(avail.is_file_available(db, FileId::new(6)));
    }

    #[test]
    fn set_available_clears_the_whole_entry() {
        let avail = DatabaseAvailability::new();
        let db = DbId::new(1);
        avail.set_unavailable(db);
        avail.set_file_availability(db, FileId::new(2), false);
        avail.set_available(db);
        assert!(avail.is_available(db));
        assert!(avail.is_file_available(db, FileId::new(2)));
    }

    #[test]
    fn recovery_sweep_fills_missing_start_and_drops_stale_dbs() {
        let avail = DatabaseAvailability::new();
        let ledger = crate::ledger::TimestampLedger::new(7);
        let gone = DbId::new(2);
        let present = DbId::new(3);
        avail.set_unavailable(gone);
        avail.set_unavailable(present);
        ledger.assign_db(present, Timestamp::new(11), true);
        ledger.assign_db(present, Timestamp::new(22), true);

        let catalog = FakeSchemaCatalog::new();
        catalog.register(present);

        avail.set_start_recovery_time(&ledger, &catalog);

        assert!(avail.is_available(gone));
        assert_eq!(avail.recovery_start(present), Some(Timestamp::new(22)));
    }
}
