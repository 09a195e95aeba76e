//! Periodic serialization and restart support (spec §4.7, §6 "Checkpoint
//! layout"). Each process writes its own `ckpt.<seq>.<processId>` file; a
//! companion `ckpt.<seq>.complete` marker appears only once every
//! process's file is present.

use crate::config::Config;
use crate::error::EngineError;
use crate::ids::ProcessId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `{sequence, processId, topologyDescriptor, timestamp}` (spec §6). The
/// `topologyDescriptor` lets a reconfigure-restart reader decode a file
/// written under a different process count without hardcoding layouts
/// (design notes §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointHeader {
    pub sequence: u64,
    pub process_id: ProcessId,
    pub topology_descriptor: String,
    pub timestamp_secs: u64,
}

/// One process's state at a checkpoint: its pool contents (ids + bounds,
/// since payloads are re-derivable from the arena via `pack`), packed
/// subproblem payloads, current incumbent, and the counters needed to
/// resume at-most-once delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub header: CheckpointHeader,
    pub local_pool_bounds: Vec<(u32, u32, f64)>,
    pub token_pool: Vec<crate::token::Token>,
    pub packed_payloads: Vec<(u32, u32, Vec<u8>)>,
    pub incumbent: Option<(f64, ProcessId, Vec<u8>)>,
    pub rebalance_count: u64,
    pub in_flight_acks: Vec<(crate::ids::Address, f64)>,
}

fn checksum(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0xcbf29ce484222325u64, |acc, &b| (acc ^ b as u64).wrapping_mul(0x100000001b3))
}

/// Serializes `snapshot` to `<dir>/ckpt.<seq>.<processId>`, appending an
/// 8-byte trailer checksum over the encoded body.
pub fn write_checkpoint(dir: &Path, snapshot: &ProcessSnapshot) -> Result<(), EngineError> {
    fs::create_dir_all(dir)?;
    let body = bincode::serialize(snapshot)?;
    let trailer = checksum(&body);

    let path = file_path(dir, snapshot.header.sequence, snapshot.header.process_id);
    let mut file = fs::File::create(path)?;
    file.write_all(&(body.len() as u64).to_le_bytes())?;
    file.write_all(&body)?;
    file.write_all(&trailer.to_le_bytes())?;
    Ok(())
}

/// Reads and validates one process's checkpoint file.
pub fn read_checkpoint(path: &Path) -> Result<ProcessSnapshot, EngineError> {
    let raw = fs::read(path)?;
    if raw.len() < 16 {
        return Err(EngineError::IncompleteCheckpoint {
            sequence: 0,
            detail: format!("{path:?} is too short to contain a checkpoint"),
        });
    }
    let body_len = u64::from_le_bytes(raw[0..8].try_into().unwrap()) as usize;
    if raw.len() < 8 + body_len + 8 {
        return Err(EngineError::IncompleteCheckpoint {
            sequence: 0,
            detail: format!("{path:?} truncated"),
        });
    }
    let body = &raw[8..8 + body_len];
    let trailer = u64::from_le_bytes(raw[8 + body_len..8 + body_len + 8].try_into().unwrap());
    if checksum(body) != trailer {
        return Err(EngineError::IncompleteCheckpoint {
            sequence: 0,
            detail: format!("{path:?} failed checksum verification"),
        });
    }
    Ok(bincode::deserialize(body)?)
}

/// Where [`write_checkpoint`] puts (and [`read_checkpoint`] expects) one
/// process's file, so a restart driver outside this module can locate it
/// without reimplementing the naming convention.
pub fn file_path(dir: &Path, sequence: u64, process_id: ProcessId) -> PathBuf {
    dir.join(format!("ckpt.{sequence}.{}", process_id.0))
}

fn complete_marker_path(dir: &Path, sequence: u64) -> PathBuf {
    dir.join(format!("ckpt.{sequence}.complete"))
}

/// Writes the barrier marker once every process's file has landed. Callers
/// are expected to call this only after confirming via
/// [`all_processes_present`].
pub fn mark_complete(dir: &Path, sequence: u64) -> Result<(), EngineError> {
    fs::write(complete_marker_path(dir, sequence), b"")?;
    Ok(())
}

pub fn is_complete(dir: &Path, sequence: u64) -> bool {
    complete_marker_path(dir, sequence).exists()
}

pub fn all_processes_present(dir: &Path, sequence: u64, process_ids: &[ProcessId]) -> bool {
    process_ids
        .iter()
        .all(|&id| file_path(dir, sequence, id).exists())
}

/// Whether enough wall-clock time has elapsed to take another checkpoint
/// (spec §4.7: `checkpointMinutes` target, `checkpointMinInterval` guard
/// against over-frequent writes when the target is very small).
pub fn due_for_checkpoint(config: &Config, seconds_since_last: f64) -> bool {
    if config.checkpoint_minutes <= 0.0 {
        return false;
    }
    seconds_since_last >= (config.checkpoint_minutes * 60.0).max(config.checkpoint_min_interval)
}

/// Redistributes a reconfigure-restart's combined subproblems and tokens
/// across a new set of process ids, round-robin (spec §4.7 "reconfigure").
/// Single-writer: only the reader calling this performs the write-back.
pub fn redistribute_round_robin<T>(items: Vec<T>, new_process_ids: &[ProcessId]) -> Vec<(ProcessId, T)> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| (new_process_ids[i % new_process_ids.len()], item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot(sequence: u64, process_id: ProcessId) -> ProcessSnapshot {
        ProcessSnapshot {
            header: CheckpointHeader {
                sequence,
                process_id,
                topology_descriptor: "1x2".to_string(),
                timestamp_secs: 0,
            },
            local_pool_bounds: vec![(0, 0, 3.0)],
            token_pool: Vec::new(),
            packed_payloads: vec![(0, 0, vec![1, 2, 3])],
            incumbent: Some((7.0, ProcessId(0), vec![9])),
            rebalance_count: 2,
            in_flight_acks: Vec::new(),
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(1, ProcessId(0));
        write_checkpoint(dir.path(), &snapshot).unwrap();

        let path = file_path(dir.path(), 1, ProcessId(0));
        let read_back = read_checkpoint(&path).unwrap();
        assert_eq!(read_back.header.sequence, 1);
        assert_eq!(read_back.incumbent.unwrap().0, 7.0);
    }

    #[test]
    fn detects_truncated_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = sample_snapshot(1, ProcessId(0));
        write_checkpoint(dir.path(), &snapshot).unwrap();

        let path = file_path(dir.path(), 1, ProcessId(0));
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 2);
        fs::write(&path, bytes).unwrap();

        assert!(read_checkpoint(&path).is_err());
    }

    #[test]
    fn complete_marker_requires_all_processes() {
        let dir = tempfile::tempdir().unwrap();
        let ids = vec![ProcessId(0), ProcessId(1)];
        write_checkpoint(dir.path(), &sample_snapshot(1, ProcessId(0))).unwrap();
        assert!(!all_processes_present(dir.path(), 1, &ids));
        write_checkpoint(dir.path(), &sample_snapshot(1, ProcessId(1))).unwrap();
        assert!(all_processes_present(dir.path(), 1, &ids));
        mark_complete(dir.path(), 1).unwrap();
        assert!(is_complete(dir.path(), 1));
    }
}
