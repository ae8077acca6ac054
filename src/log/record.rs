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

//! The four checkpoint log record kinds (`§4.7`) and their on-disk framing (`§4.7.1`):
//! an 8-byte little-endian CRC-64/XZ checksum, an 8-byte little-endian payload length, then the
//! payload itself (a `ClassId` tag byte followed by the record body). Grounded on the journal
//! event framing used by storage engines that checksum each record independently rather than
//! relying on a single log-wide hash.

use {
    crate::{
        error::{Error, ErrorKind, RuntimeResult},
        ids::{DbId, HeuristicDecision, Lsn, Timestamp, Xid},
    },
    crc::{Crc, CRC_64_XZ},
};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

const CLASS_SYSTEM_CHECKPOINT_V1: u8 = 1;
const CLASS_DATABASE_CHECKPOINT_V2: u8 = 2;
const CLASS_FILE_SYNCHRONIZE_BEGIN: u8 = 3;
const CLASS_FILE_SYNCHRONIZE_END: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One in-progress transaction branch as captured at checkpoint time, serialized inline in a
/// `DatabaseCheckpointV2` record so recovery can replay exactly the branches that were open.
pub struct InProgressTxnInfo {
    pub xid: Xid,
    pub begin_lsn: Lsn,
    pub last_lsn: Lsn,
    pub heuristic: Option<HeuristicDecision>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Written once per global checkpoint, to the system database's log (`§4.3.1` step 9).
pub struct SystemCheckpointV1 {
    pub timestamp: Timestamp,
    /// the global checkpoint timestamp this one superseded
    pub previous_ts: Timestamp,
    pub synchronized: bool,
    /// set when this checkpoint ran as part of process shutdown, marking the log cleanly closed
    pub terminated: bool,
    /// always false: this crate has no notion of the schema/meta catalog itself being
    /// unavailable, only individual databases (`§1`'s collaborator boundary keeps catalog-wide
    /// failure out of scope)
    pub meta_unavailable: bool,
    /// every currently-unavailable database and its recovery-start timestamp (`§4.6`'s
    /// `getUnavailable()` snapshot)
    pub unavailable_databases: Vec<(DbId, Timestamp)>,
    /// distributed-transaction branches resolved unilaterally since the last checkpoint
    pub heuristically_completed_branches: Vec<(Xid, HeuristicDecision)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Written once per database at the end of its own checkpoint (`§4.3.2` step 6), recording
/// enough to replay recovery without rescanning the whole log: the oldest relevant LSN and
/// every transaction branch still open as of that LSN.
pub struct DatabaseCheckpointV2 {
    pub db: DbId,
    pub timestamp: Timestamp,
    /// the previous `DatabaseCheckpoint` timestamp on this same log
    pub previous_ts: Timestamp,
    /// set when this checkpoint ran as part of process shutdown, marking the log cleanly closed
    pub terminated: bool,
    pub oldest_relevant_lsn: Lsn,
    pub in_progress: Vec<InProgressTxnInfo>,
    /// true iff the buffer layer reported `persisted` for the pass that produced this record;
    /// always true for a `§4.3.2` per-database checkpoint, since that pass flushes unconditionally
    pub synchronized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A checkpoint log record, as described in `§4.7`.
pub enum CheckpointLogRecord {
    SystemCheckpoint(SystemCheckpointV1),
    DatabaseCheckpoint(DatabaseCheckpointV2),
    /// the file synchronizer started a pass over one file (`§4.4.1`)
    FileSynchronizeBegin,
    /// the file synchronizer finished a pass; `modified` says whether anything was written
    FileSynchronizeEnd { modified: bool },
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn put_u128(buf: &mut Vec<u8>, v: u128) {
    buf.extend_from_slice(&v.to_le_bytes());
}
fn get_u32(buf: &[u8], at: &mut usize) -> RuntimeResult<u32> {
    let bytes = buf
        .get(*at..*at + 4)
        .ok_or_else(|| Error::from(ErrorKind::LogCorrupted))?;
    *at += 4;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}
fn get_u64(buf: &[u8], at: &mut usize) -> RuntimeResult<u64> {
    let bytes = buf
        .get(*at..*at + 8)
        .ok_or_else(|| Error::from(ErrorKind::LogCorrupted))?;
    *at += 8;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}
fn get_u128(buf: &[u8], at: &mut usize) -> RuntimeResult<u128> {
    let bytes = buf
        .get(*at..*at + 16)
        .ok_or_else(|| Error::from(ErrorKind::LogCorrupted))?;
    *at += 16;
    Ok(u128::from_le_bytes(bytes.try_into().unwrap()))
}
fn get_u8(buf: &[u8], at: &mut usize) -> RuntimeResult<u8> {
    let b = *buf.get(*at).ok_or_else(|| Error::from(ErrorKind::LogCorrupted))?;
    *at += 1;
    Ok(b)
}

impl CheckpointLogRecord {
    fn class_id(&self) -> u8 {
        match self {
            Self::SystemCheckpoint(_) => CLASS_SYSTEM_CHECKPOINT_V1,
            Self::DatabaseCheckpoint(_) => CLASS_DATABASE_CHECKPOINT_V2,
            Self::FileSynchronizeBegin => CLASS_FILE_SYNCHRONIZE_BEGIN,
            Self::FileSynchronizeEnd { .. } => CLASS_FILE_SYNCHRONIZE_END,
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) {
        match self {
            Self::SystemCheckpoint(rec) => {
                // §6.1 order: finishTs, previousTs, synchronized, terminated, metaUnavailable,
                // n, n×{dbId, recoveryStart}, m, m×{XID, decision}
                put_u64(buf, rec.timestamp.raw());
                put_u64(buf, rec.previous_ts.raw());
                buf.push(rec.synchronized as u8);
                buf.push(rec.terminated as u8);
                buf.push(rec.meta_unavailable as u8);
                put_u32(buf, rec.unavailable_databases.len() as u32);
                for (db, recovery_start) in &rec.unavailable_databases {
                    put_u32(buf, db.raw());
                    put_u64(buf, recovery_start.raw());
                }
                put_u32(buf, rec.heuristically_completed_branches.len() as u32);
                for (xid, decision) in &rec.heuristically_completed_branches {
                    put_u128(buf, xid.raw());
                    put_u32(buf, *decision as u32);
                }
            }
            Self::DatabaseCheckpoint(rec) => {
                // §6.1 order: db, finishTs, previousTs, synchronized, terminated,
                // oldestRelevantLsn, n, n×{xid, beginLsn, lastLsn, heuristic}
                put_u64(buf, rec.db.raw() as u64);
                put_u64(buf, rec.timestamp.raw());
                put_u64(buf, rec.previous_ts.raw());
                buf.push(rec.synchronized as u8);
                buf.push(rec.terminated as u8);
                put_u64(buf, rec.oldest_relevant_lsn.raw());
                put_u64(buf, rec.in_progress.len() as u64);
                for txn in &rec.in_progress {
                    put_u128(buf, txn.xid.raw());
                    put_u64(buf, txn.begin_lsn.raw());
                    put_u64(buf, txn.last_lsn.raw());
                    match txn.heuristic {
                        None => buf.push(0),
                        Some(HeuristicDecision::Commit) => buf.push(1),
                        Some(HeuristicDecision::Rollback) => buf.push(2),
                    }
                }
            }
            Self::FileSynchronizeBegin => {}
            Self::FileSynchronizeEnd { modified } => {
                buf.push(*modified as u8);
            }
        }
    }

    /// frame and checksum this record: `[crc64: u64][len: u64][class: u8][payload]`, mirroring
    /// the teacher's raw journal adapter.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = vec![self.class_id()];
        self.encode_payload(&mut body);
        let checksum = CRC64.checksum(&body);
        let mut framed = Vec::with_capacity(8 + 8 + body.len());
        put_u64(&mut framed, checksum);
        put_u64(&mut framed, body.len() as u64);
        framed.extend_from_slice(&body);
        framed
    }

    /// decode a single framed record, verifying its checksum. Returns the record and the number
    /// of bytes consumed from `buf`, so a caller can walk a stream of concatenated records.
    pub fn decode(buf: &[u8]) -> RuntimeResult<(Self, usize)> {
        let mut at = 0usize;
        let stored_crc = get_u64(buf, &mut at)?;
        let len = get_u64(buf, &mut at)? as usize;
        let body = buf
            .get(at..at + len)
            .ok_or_else(|| Error::from(ErrorKind::LogCorrupted))?;
        at += len;
        if CRC64.checksum(body) != stored_crc {
            return Err(Error::from(ErrorKind::LogCorrupted));
        }
        let mut body_at = 0usize;
        let class = get_u8(body, &mut body_at)?;
        let record = match class {
            CLASS_SYSTEM_CHECKPOINT_V1 => {
                let timestamp = Timestamp::new(get_u64(body, &mut body_at)?);
                let previous_ts = Timestamp::new(get_u64(body, &mut body_at)?);
                let synchronized = get_u8(body, &mut body_at)? != 0;
                let terminated = get_u8(body, &mut body_at)? != 0;
                let meta_unavailable = get_u8(body, &mut body_at)? != 0;
                let n = get_u32(body, &mut body_at)? as usize;
                let mut unavailable_databases = Vec::with_capacity(n);
                for _ in 0..n {
                    let db = DbId::new(get_u32(body, &mut body_at)?);
                    let recovery_start = Timestamp::new(get_u64(body, &mut body_at)?);
                    unavailable_databases.push((db, recovery_start));
                }
                let m = get_u32(body, &mut body_at)? as usize;
                let mut heuristically_completed_branches = Vec::with_capacity(m);
                for _ in 0..m {
                    let xid = Xid::new(get_u128(body, &mut body_at)?);
                    let decision = HeuristicDecision::from_u32(get_u32(body, &mut body_at)?)
                        .ok_or_else(|| Error::from(ErrorKind::LogCorrupted))?;
                    heuristically_completed_branches.push((xid, decision));
                }
                Self::SystemCheckpoint(SystemCheckpointV1 {
                    timestamp,
                    previous_ts,
                    synchronized,
                    terminated,
                    meta_unavailable,
                    unavailable_databases,
                    heuristically_completed_branches,
                })
            }
            CLASS_DATABASE_CHECKPOINT_V2 => {
                let db = DbId::new(get_u64(body, &mut body_at)? as u32);
                let timestamp = Timestamp::new(get_u64(body, &mut body_at)?);
                let previous_ts = Timestamp::new(get_u64(body, &mut body_at)?);
                let synchronized = get_u8(body, &mut body_at)? != 0;
                let terminated = get_u8(body, &mut body_at)? != 0;
                let oldest_relevant_lsn = Lsn::new(get_u64(body, &mut body_at)?);
                let n = get_u64(body, &mut body_at)? as usize;
                let mut in_progress = Vec::with_capacity(n);
                for _ in 0..n {
                    let xid = Xid::new(get_u128(body, &mut body_at)?);
                    let begin_lsn = Lsn::new(get_u64(body, &mut body_at)?);
                    let last_lsn = Lsn::new(get_u64(body, &mut body_at)?);
                    let heuristic = match get_u8(body, &mut body_at)? {
                        0 => None,
                        1 => Some(HeuristicDecision::Commit),
                        2 => Some(HeuristicDecision::Rollback),
                        _ => return Err(Error::from(ErrorKind::LogCorrupted)),
                    };
                    in_progress.push(InProgressTxnInfo {
                        xid,
                        begin_lsn,
                        last_lsn,
                        heuristic,
                    });
                }
                Self::DatabaseCheckpoint(DatabaseCheckpointV2 {
                    db,
                    timestamp,
                    previous_ts,
                    terminated,
                    oldest_relevant_lsn,
                    in_progress,
                    synchronized,
                })
            }
            CLASS_FILE_SYNCHRONIZE_BEGIN => Self::FileSynchronizeBegin,
            CLASS_FILE_SYNCHRONIZE_END => Self::FileSynchronizeEnd {
                modified: get_u8(body, &mut body_at)? != 0,
            },
            _ => return Err(Error::from(ErrorKind::LogCorrupted)),
        };
        Ok((record, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_checkpoint_round_trips() {
        let rec = CheckpointLogRecord::SystemCheckpoint(SystemCheckpointV1 {
            timestamp: Timestamp::new(42),
            previous_ts: Timestamp::new(30),
            synchronized: true,
            terminated: false,
            meta_unavailable: false,
            unavailable_databases: vec![(DbId::new(7), Timestamp::new(12))],
            heuristically_completed_branches: vec![(Xid::new(9), HeuristicDecision::Commit)],
        });
        let framed = rec.encode();
        let (decoded, consumed) = CheckpointLogRecord::decode(&framed).unwrap();
        assert_eq!(consumed, framed.len());
        assert_eq!(decoded, rec);
    }

    #[test]
    fn database_checkpoint_with_in_progress_txns_round_trips() {
        let rec = CheckpointLogRecord::DatabaseCheckpoint(DatabaseCheckpointV2 {
            db: DbId::new(3),
            timestamp: Timestamp::new(99),
            previous_ts: Timestamp::new(80),
            terminated: false,
            oldest_relevant_lsn: Lsn::new(1000),
            in_progress: vec![
                InProgressTxnInfo {
                    xid: Xid::new(555),
                    begin_lsn: Lsn::new(900),
                    last_lsn: Lsn::new(980),
                    heuristic: None,
                },
                InProgressTxnInfo {
                    xid: Xid::new(556),
                    begin_lsn: Lsn::new(910),
                    last_lsn: Lsn::new(990),
                    heuristic: Some(HeuristicDecision::Rollback),
                },
            ],
            synchronized: true,
        });
        let framed = rec.encode();
        let (decoded, _) = CheckpointLogRecord::decode(&framed).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn file_synchronize_pair_round_trips() {
        let begin = CheckpointLogRecord::FileSynchronizeBegin;
        let end = CheckpointLogRecord::FileSynchronizeEnd { modified: true };
        assert_eq!(CheckpointLogRecord::decode(&begin.encode()).unwrap().0, begin);
        assert_eq!(CheckpointLogRecord::decode(&end.encode()).unwrap().0, end);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let rec = CheckpointLogRecord::FileSynchronizeEnd { modified: false };
        let mut framed = rec.encode();
        let last = framed.len() - 1;
        framed[last] ^= 0xff;
        assert!(CheckpointLogRecord::decode(&framed).is_err());
    }

    #[test]
    fn concatenated_records_decode_in_sequence() {
        let a = CheckpointLogRecord::FileSynchronizeBegin;
        let b = CheckpointLogRecord::FileSynchronizeEnd { modified: true };
        let mut stream = a.encode();
        stream.extend_from_slice(&b.encode());
        let (first, n1) = CheckpointLogRecord::decode(&stream).unwrap();
        assert_eq!(first, a);
        let (second, _) = CheckpointLogRecord::decode(&stream[n1..]).unwrap();
        assert_eq!(second, b);
    }
}
