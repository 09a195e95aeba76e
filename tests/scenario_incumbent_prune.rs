//! Spec §8 scenario 4: a synthetic tree where 100 subproblems carry bound
//! `10.0` and one carries bound `5.0` (minimization), with the feasible
//! incumbent discovered at the *last-created* subproblem (value `6.0`).
//! After the incumbent broadcast, every pool must be free of subproblems
//! whose bound is dominated by `6.0`.

use parabb::application::Sense;
use parabb::ids::{Address, ProcessId, SubproblemId};
use parabb::incumbent::IncumbentTracker;
use parabb::pool::{LocalPool, TokenPool};
use parabb::token::{Token, TokenKind};

fn sp_id(slot: u32) -> SubproblemId {
    SubproblemId { slot, generation: 0 }
}

fn token(slot: u32, bound: f64, sequence: u64) -> Token {
    Token {
        address: Address {
            home: ProcessId(0),
            local: sp_id(slot),
        },
        bound,
        kind: TokenKind::SelfToken,
        multiplicity: 1,
        sequence,
        payload: Vec::new(),
    }
}

#[test]
fn incumbent_broadcast_prunes_every_dominated_subproblem() {
    let sense = Sense::Min;
    let mut local = LocalPool::new(sense);
    let mut tokens = TokenPool::new(sense);

    // 100 subproblems at bound 10.0, split across the local pool and the
    // hub's token pool.
    for i in 0..60u32 {
        local.insert(sp_id(i), 10.0);
    }
    for i in 60..100u32 {
        tokens.insert(token(i, 10.0, i as u64));
    }
    // One genuinely better-bounded subproblem that survives pruning.
    local.insert(sp_id(100), 5.0);
    // The last-created subproblem is the feasible incumbent itself.
    let incumbent_id = sp_id(101);
    local.insert(incumbent_id, 6.0);

    let mut tracker: IncumbentTracker<Vec<usize>> = IncumbentTracker::new(sense);
    let replaced = tracker.offer(6.0, ProcessId(0), vec![101]);
    assert!(replaced);

    // The incumbent's own node is removed by the caller before pruning
    // (it was a leaf, never re-inserted as ongoing work).
    local.remove(incumbent_id);

    let incumbent_value = tracker.value().unwrap();
    let pruned_local = local.prune(incumbent_value);
    let pruned_tokens = tokens.prune(incumbent_value);

    assert_eq!(pruned_local.len(), 60); // the 60 subproblems at bound 10.0
    assert_eq!(pruned_tokens.len(), 40); // the 40 tokens at bound 10.0

    assert_eq!(local.len(), 1);
    assert!(tokens.is_empty());
}
