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

//! `§4.2 DirtyPageFlusher`: periodically writes back pages from pools whose dirty ratio has
//! crossed the configured coefficient, or everything when the owning thread is aborting.

use {
    crate::{
        collaborators::{BufferPoolSet, FlushFilter},
        daemon::{Daemon, DaemonControl, StepOutcome},
    },
    ::log::warn,
    std::sync::Arc,
};

pub struct DirtyPageFlusher {
    pools: Arc<dyn BufferPoolSet>,
    flush_coefficient: u8,
}

impl DirtyPageFlusher {
    pub fn new(pools: Arc<dyn BufferPoolSet>, flush_coefficient: u8) -> Self {
        Self {
            pools,
            flush_coefficient,
        }
    }
}

impl Daemon for DirtyPageFlusher {
    fn step(&self, ctl: &DaemonControl) -> StepOutcome {
        let filter = if ctl.is_aborting() {
            FlushFilter::All
        } else {
            FlushFilter::AboveThreshold(self.flush_coefficient)
        };
        // pools are visited in the order the collaborator hands them out (Normal before
        // LogicalLog, per `§4.2`'s category order); each pool's flush is independent, so one
        // pool failing does not stop the others.
        for pool in self.pools.pools() {
            match pool.flush(filter) {
                Ok(_) => {}
                Err(e) => warn!(
                    "dirty page flush failed for database {}: {e}",
                    pool.db()
                ),
            }
        }
        if ctl.is_aborting() {
            StepOutcome::Aborted
        } else {
            StepOutcome::Ran
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collaborators::PoolCategory,
        ids::DbId,
        test_util::{FakeBufferPool, FakeBufferPoolSet},
    };

    #[test]
    fn flushes_only_pools_above_threshold() {
        let pools = Arc::new(FakeBufferPoolSet::new());
        let below = Arc::new(FakeBufferPool::new(DbId::new(1), PoolCategory::Normal));
        below.set_dirty(10, 5);
        let above = Arc::new(FakeBufferPool::new(DbId::new(2), PoolCategory::Normal));
        above.set_dirty(90, 20);
        pools.add(below.clone());
        pools.add(above.clone());

        let flusher = DirtyPageFlusher::new(pools, 70);
        let ctl = DaemonControl::for_test(false);
        assert_eq!(flusher.step(&ctl), StepOutcome::Ran);
        assert_eq!(below.dirty_ratio(), 10);
        assert_eq!(above.dirty_ratio(), 0);
    }

    #[test]
    fn aborting_flushes_everything_regardless_of_threshold() {
        let pools = Arc::new(FakeBufferPoolSet::new());
        let low = Arc::new(FakeBufferPool::new(DbId::new(1), PoolCategory::Normal));
        low.set_dirty(1, 3);
        pools.add(low.clone());

        let flusher = DirtyPageFlusher::new(pools, 70);
        let ctl = DaemonControl::for_test(true);
        assert_eq!(flusher.step(&ctl), StepOutcome::Aborted);
        assert_eq!(low.dirty_ratio(), 0);
    }
}
