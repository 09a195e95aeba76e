//! Inter-cluster radix-tree load balancer (spec §4.5): reduces
//! `ClusterLoad` up the tree, broadcasts `GlobalLoad` down, and performs
//! pairwise donor/receiver redistribution within sibling groups.

use crate::ids::ProcessId;
use crate::message::LoadBlock;

/// A cluster's role in one redistribution round, relative to the sibling
/// average (spec §4.5 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Donor,
    Receiver,
    Neutral,
}

/// Reduces a set of per-cluster `ClusterLoad`s into one `GlobalLoad`
/// (spec §4.5 step 1). `mismatch_flag` is set if the children disagree on
/// incumbent value, which the caller uses to detect termination
/// disagreement (spec §7).
pub fn reduce(children: &[LoadBlock]) -> LoadBlock {
    if children.is_empty() {
        return LoadBlock {
            count: 0,
            aggregate_bound: 0.0,
            incumbent_value: f64::INFINITY,
            memory: None,
            mismatch_flag: false,
        };
    }

    let count = children.iter().map(|c| c.count).sum();
    let aggregate_bound = children.iter().map(|c| c.aggregate_bound).sum();
    let memory = children.iter().filter_map(|c| c.memory).sum::<u64>();
    let memory = if children.iter().any(|c| c.memory.is_some()) {
        Some(memory)
    } else {
        None
    };

    let first_value = children[0].incumbent_value;
    let mismatch_flag = children
        .iter()
        .any(|c| c.incumbent_value != first_value || c.mismatch_flag);
    let incumbent_value = children
        .iter()
        .map(|c| c.incumbent_value)
        .fold(f64::INFINITY, f64::min);

    LoadBlock {
        count,
        aggregate_bound,
        incumbent_value,
        memory,
        mismatch_flag,
    }
}

/// Classifies one cluster relative to the sibling-group average (spec
/// §4.5 step 3): a donor if `count > donorFac * avg` and
/// `count >= minSourceCount`; a receiver if `count < receiverFac * avg`.
pub fn classify(count: usize, avg: f64, donor_fac: f64, receiver_fac: f64, min_source_count: usize) -> Role {
    if (count as f64) > donor_fac * avg && count >= min_source_count {
        Role::Donor
    } else if (count as f64) < receiver_fac * avg {
        Role::Receiver
    } else {
        Role::Neutral
    }
}

/// One token moved from a donor cluster to a receiver cluster.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub from: ProcessId,
    pub to: ProcessId,
    pub count: usize,
}

/// Computes pairwise transfers from donors to receivers, each donor
/// shipping at most `max_load_bal_size` tokens, filling receivers back
/// toward `avg` before moving to the next (spec §4.5 step 3, "best-first"
/// token selection is the caller's responsibility at the TokenPool level —
/// this function only decides *how many* move between which clusters).
pub fn plan_redistribution(
    loads: &[(ProcessId, usize)],
    avg: f64,
    donor_fac: f64,
    receiver_fac: f64,
    min_source_count: usize,
    max_load_bal_size: usize,
) -> Vec<Transfer> {
    let mut donors: Vec<(ProcessId, usize)> = Vec::new();
    let mut receivers: Vec<(ProcessId, usize)> = Vec::new();

    for &(id, count) in loads {
        match classify(count, avg, donor_fac, receiver_fac, min_source_count) {
            Role::Donor => donors.push((id, count)),
            Role::Receiver => receivers.push((id, count)),
            Role::Neutral => {}
        }
    }

    let mut transfers = Vec::new();
    let mut receiver_idx = 0;
    for (donor_id, donor_count) in donors {
        let mut remaining = max_load_bal_size.min(donor_count.saturating_sub(avg as usize));
        while remaining > 0 && receiver_idx < receivers.len() {
            let (receiver_id, receiver_count) = receivers[receiver_idx];
            let deficit = (avg as usize).saturating_sub(receiver_count);
            let give = remaining.min(deficit.max(1));
            if give == 0 {
                receiver_idx += 1;
                continue;
            }
            transfers.push(Transfer {
                from: donor_id,
                to: receiver_id,
                count: give,
            });
            remaining -= give;
            receivers[receiver_idx].1 += give;
            if receivers[receiver_idx].1 >= avg as usize {
                receiver_idx += 1;
            }
        }
    }
    transfers
}

/// The interval a round should wait before the next, inflated by
/// `loadBalIdleIncrease` while termination is suspected (spec §4.5
/// "Timing").
pub fn next_round_interval(base_seconds: f64, idle_increase: f64, termination_suspected: bool) -> f64 {
    if termination_suspected {
        base_seconds * idle_increase
    } else {
        base_seconds
    }
}

/// True once the tree-reduction condition for global termination holds
/// (spec §4.5 "Termination", §5): zero global work, incumbent sources
/// agree, and (per the caller, tracked via its own in-flight counters) no
/// messages remain in flight.
pub fn termination_reached(global: &LoadBlock, no_messages_in_flight: bool) -> bool {
    global.count == 0 && !global.mismatch_flag && no_messages_in_flight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(count: usize, incumbent: f64) -> LoadBlock {
        LoadBlock {
            count,
            aggregate_bound: count as f64,
            incumbent_value: incumbent,
            memory: None,
            mismatch_flag: false,
        }
    }

    #[test]
    fn reduce_sums_counts_and_flags_mismatch() {
        let global = reduce(&[block(3, 5.0), block(2, 6.0)]);
        assert_eq!(global.count, 5);
        assert!(global.mismatch_flag);
        assert_eq!(global.incumbent_value, 5.0);
    }

    #[test]
    fn classify_by_thresholds() {
        assert_eq!(classify(20, 10.0, 1.5, 0.5, 2), Role::Donor);
        assert_eq!(classify(2, 10.0, 1.5, 0.5, 2), Role::Receiver);
        assert_eq!(classify(10, 10.0, 1.5, 0.5, 2), Role::Neutral);
    }

    #[test]
    fn redistribution_moves_excess_toward_receivers() {
        let loads = vec![(ProcessId(0), 20), (ProcessId(1), 0)];
        let transfers = plan_redistribution(&loads, 10.0, 1.5, 0.5, 2, 16);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].from, ProcessId(0));
        assert_eq!(transfers[0].to, ProcessId(1));
        assert!(transfers[0].count > 0);
    }

    #[test]
    fn termination_requires_agreement_and_drained_messages() {
        let global = block(0, 7.0);
        assert!(termination_reached(&global, true));
        assert!(!termination_reached(&global, false));
        let mut mismatched = global;
        mismatched.mismatch_flag = true;
        assert!(!termination_reached(&mismatched, true));
    }
}
