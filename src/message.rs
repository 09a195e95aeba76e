//! Inter-process wire format (spec §6). Every message begins, conceptually,
//! with a signal byte naming its variant; in this implementation that's
//! just the outer `Message` enum discriminant, `bincode`-encoded — the
//! teacher's own stack has no serialization story, so this pairing
//! (`serde` + `bincode`) is borrowed from the `timely-dataflow` example in
//! the retrieval pack, which uses it for the same purpose.

use crate::ids::{Address, ProcessId};
use crate::token::Token;
use serde::{Deserialize, Serialize};

/// One `(hubAddress, bound, packedSubproblem)` tuple as carried by an
/// `SpDeliver` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredSubproblem {
    pub address: Address,
    pub bound: f64,
    pub packed: Vec<u8>,
}

/// A worker's acknowledgement of a delivered subproblem, batched back to
/// the hub in the next `HubUpdate` (spec §4.3 "Hub acknowledgements").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub address: Address,
    pub bound: f64,
}

/// `{count, aggregateBound, incumbentValue, memory?, mismatchFlag}`
/// (spec §3 `ClusterLoad`/`GlobalLoad` — both use this shape).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoadBlock {
    pub count: usize,
    pub aggregate_bound: f64,
    pub incumbent_value: f64,
    pub memory: Option<u64>,
    pub mismatch_flag: bool,
}

/// `{value, source, solutionPayload}` (spec §3 `Incumbent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncumbentMessage {
    pub value: f64,
    pub source: ProcessId,
    pub payload: Vec<u8>,
}

/// Every inter-process message, discriminant-tagged (spec §6's signal
/// byte: `spDeliver`, `spBufferWarning`, `hubUpdate`, `loadBalance`,
/// `incumbent`, `checkpointBarrier`, `abort`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Hub -> worker: dispatch of one or more subproblems.
    SpDeliver(Vec<DeliveredSubproblem>),
    /// Sent ahead of a payload that would overflow the receiver's known
    /// buffer size, naming the size the receiver must grow to (spec §5
    /// back-pressure, §7 buffer-overflow recovery).
    SpBufferWarning { grow_to_at_least: usize },
    /// Worker -> hub: releases plus batched acks, and the two-way
    /// `(numTokens, tokens.., loadBlock?, acks.., messageAdjust,
    /// rebalanceFlag)` shape from spec §6.
    HubUpdate {
        tokens: Vec<Token>,
        load_block: Option<LoadBlock>,
        acks: Vec<DeliveryAck>,
        message_adjust: i64,
        rebalance_flag: bool,
    },
    /// Hub <-> hub / root: one load-balancing round.
    LoadBalance {
        round: u64,
        cluster_load: LoadBlock,
        global_load: Option<LoadBlock>,
    },
    /// Hub -> all its workers: `broadcastLoadIfNeeded` (spec §4.4), carrying
    /// the cluster/global load snapshot, the hub's rebalance counter (the
    /// synchronization fence `should_rebalance` checks), and this worker's
    /// per-process target pool size.
    HubBroadcast {
        cluster_load: LoadBlock,
        global_load: Option<LoadBlock>,
        rebalance_count: u64,
        load_bal_round: u64,
        target: f64,
    },
    /// Tree broadcast of the best-known feasible solution.
    Incumbent(IncumbentMessage),
    /// Checkpoint-complete barrier marker.
    CheckpointBarrier { sequence: u64 },
    /// Orderly-shutdown signal, broadcast by the process that aborted.
    Abort { reason: String },
}

/// Encodes a message for transport or checkpoint storage.
pub fn encode(message: &Message) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(message)
}

/// Decodes a message previously produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Message, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubproblemId;

    #[test]
    fn round_trips_through_bincode() {
        let msg = Message::Incumbent(IncumbentMessage {
            value: 7.0,
            source: ProcessId(3),
            payload: vec![1, 2, 3],
        });
        let bytes = encode(&msg).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded {
            Message::Incumbent(inc) => {
                assert_eq!(inc.value, 7.0);
                assert_eq!(inc.source, ProcessId(3));
                assert_eq!(inc.payload, vec![1, 2, 3]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn sp_deliver_round_trips() {
        let msg = Message::SpDeliver(vec![DeliveredSubproblem {
            address: Address {
                home: ProcessId(1),
                local: SubproblemId {
                    slot: 2,
                    generation: 0,
                },
            },
            bound: 1.5,
            packed: vec![9, 9],
        }]);
        let bytes = encode(&msg).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded {
            Message::SpDeliver(v) => assert_eq!(v.len(), 1),
            _ => panic!("wrong variant"),
        }
    }
}
