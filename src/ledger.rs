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

//! `§4.5 TimestampLedger`: tracks the two most recent checkpoint timestamps, both globally and
//! per database, so later checkpoints know how far back they must consider the log "in use".

use {crate::ids::{DbId, Timestamp}, parking_lot::Mutex, std::collections::HashMap};

#[derive(Debug, Clone, Copy, Default)]
struct TimestampPair {
    most_recent: Timestamp,
    second_most_recent: Timestamp,
}

impl TimestampPair {
    fn assign(&mut self, ts: Timestamp, synchronized: bool) {
        if synchronized {
            // a synchronized assignment collapses both slots onto the new value
            self.most_recent = ts;
            self.second_most_recent = ts;
        } else {
            // a non-synchronized assignment unconditionally rotates the old most-recent into
            // second-most-recent
            self.second_most_recent = self.most_recent;
            self.most_recent = ts;
        }
    }
}

struct LedgerState {
    global: TimestampPair,
    per_db: HashMap<DbId, TimestampPair>,
}

/// Process-wide most-recent/second-most-recent checkpoint timestamps.
pub struct TimestampLedger {
    state: Mutex<LedgerState>,
}

impl TimestampLedger {
    pub fn new(table_size_hint: usize) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                global: TimestampPair::default(),
                per_db: HashMap::with_capacity(table_size_hint),
            }),
        }
    }

    /// record a new global checkpoint timestamp
    pub fn assign_global(&self, ts: Timestamp, synchronized: bool) {
        self.state.lock().global.assign(ts, synchronized);
    }

    /// record a new per-database checkpoint timestamp
    pub fn assign_db(&self, db: DbId, ts: Timestamp, synchronized: bool) {
        self.state
            .lock()
            .per_db
            .entry(db)
            .or_insert_with(TimestampPair::default)
            .assign(ts, synchronized);
    }

    pub fn global_most_recent(&self) -> Timestamp {
        self.state.lock().global.most_recent
    }

    pub fn global_second_most_recent(&self) -> Timestamp {
        self.state.lock().global.second_most_recent
    }

    pub fn db_most_recent(&self, db: DbId) -> Timestamp {
        self.state
            .lock()
            .per_db
            .get(&db)
            .map(|p| p.most_recent)
            .unwrap_or(Timestamp::ILLEGAL)
    }

    pub fn db_second_most_recent(&self, db: DbId) -> Timestamp {
        self.state
            .lock()
            .per_db
            .get(&db)
            .map(|p| p.second_most_recent)
            .unwrap_or(Timestamp::ILLEGAL)
    }

    /// drop all bookkeeping for a database that has been dropped from the schema catalog
    pub fn forget_db(&self, db: DbId) {
        self.state.lock().per_db.remove(&db);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronized_assignment_collapses_both_slots() {
        let ledger = TimestampLedger::new(7);
        ledger.assign_global(Timestamp::new(10), true);
        ledger.assign_global(Timestamp::new(20), true);
        assert_eq!(ledger.global_most_recent(), Timestamp::new(20));
        assert_eq!(ledger.global_second_most_recent(), Timestamp::new(20));
    }

    #[test]
    fn non_synchronized_assignment_rotates_unconditionally() {
        let ledger = TimestampLedger::new(7);
        ledger.assign_global(Timestamp::new(20), true);
        ledger.assign_global(Timestamp::new(15), false);
        assert_eq!(ledger.global_most_recent(), Timestamp::new(15));
        assert_eq!(ledger.global_second_most_recent(), Timestamp::new(20));
    }

    #[test]
    fn per_db_tracking_is_independent_of_global() {
        let ledger = TimestampLedger::new(7);
        let db = DbId::new(3);
        ledger.assign_global(Timestamp::new(100), true);
        ledger.assign_db(db, Timestamp::new(5), true);
        assert_eq!(ledger.db_most_recent(db), Timestamp::new(5));
        assert_eq!(ledger.global_most_recent(), Timestamp::new(100));
        assert_eq!(ledger.db_most_recent(DbId::new(4)), Timestamp::ILLEGAL);
    }

    #[test]
    fn forget_db_clears_its_entry() {
        let ledger = TimestampLedger::new(7);
        let db = DbId::new(9);
        ledger.assign_db(db, Timestamp::new(5), true);
        ledger.forget_db(db);
        assert_eq!(ledger.db_most_recent(db), Timestamp::ILLEGAL);
    }
}
