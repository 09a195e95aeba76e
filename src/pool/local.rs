//! Ordered collection of ready-to-bound / ready-to-split subproblems at
//! one process (spec §4.2).

use crate::application::Sense;
use crate::ids::SubproblemId;
use crate::pool::LoadSnapshot;
use crate::pool::heap::IndexedHeap;
use std::collections::HashMap;

struct Entry {
    bound: f64,
    sequence: u64,
}

/// Application-ordered pool of subproblem ids local to one worker. Stores
/// only the ordering key (`bound`) and insertion sequence for each member;
/// the subproblem's actual payload lives in the process's
/// [`crate::subproblem::SubproblemArena`].
pub struct LocalPool {
    sense: Sense,
    heap: IndexedHeap<SubproblemId>,
    entries: HashMap<SubproblemId, Entry>,
    next_sequence: u64,
    aggregate_bound: f64,
}

impl LocalPool {
    pub fn new(sense: Sense) -> Self {
        LocalPool {
            sense,
            heap: IndexedHeap::new(),
            entries: HashMap::new(),
            next_sequence: 0,
            aggregate_bound: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: SubproblemId) -> bool {
        self.entries.contains_key(&id)
    }

    fn compare(&self, a: SubproblemId, b: SubproblemId) -> std::cmp::Ordering {
        let ea = &self.entries[&a];
        let eb = &self.entries[&b];
        self.sense
            .order_bound(ea.bound, eb.bound)
            .then_with(|| eb.sequence.cmp(&ea.sequence))
    }

    /// Inserts `id` with the given `bound`. O(log n).
    pub fn insert(&mut self, id: SubproblemId, bound: f64) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert(
            id,
            Entry {
                bound,
                sequence,
            },
        );
        self.aggregate_bound += bound;
        let entries = &self.entries;
        let sense = self.sense;
        self.heap.insert(id, |a, b| {
            sense
                .order_bound(entries[&a].bound, entries[&b].bound)
                .then_with(|| entries[&b].sequence.cmp(&entries[&a].sequence))
        });
    }

    /// Removes a specific subproblem from the pool (e.g. it was chosen to
    /// be released as a token rather than bounded further).
    pub fn remove(&mut self, id: SubproblemId) -> bool {
        let entries = &self.entries;
        let sense = self.sense;
        let removed = self.heap.remove(id, |a, b| {
            sense
                .order_bound(entries[&a].bound, entries[&b].bound)
                .then_with(|| entries[&b].sequence.cmp(&entries[&a].sequence))
        });
        if removed {
            if let Some(e) = self.entries.remove(&id) {
                self.aggregate_bound -= e.bound;
            }
        }
        removed
    }

    /// Returns the element the application prioritizes without removing it.
    pub fn peek_best(&self) -> Option<SubproblemId> {
        self.heap.peek()
    }

    /// Removes and returns the element the application prioritizes; ties
    /// are broken by insertion order (earliest first).
    pub fn select_best(&mut self) -> Option<SubproblemId> {
        let entries = &self.entries;
        let sense = self.sense;
        let best = self.heap.pop(|a, b| {
            sense
                .order_bound(entries[&a].bound, entries[&b].bound)
                .then_with(|| entries[&b].sequence.cmp(&entries[&a].sequence))
        });
        if let Some(id) = best {
            if let Some(e) = self.entries.remove(&id) {
                self.aggregate_bound -= e.bound;
            }
        }
        best
    }

    /// Removes every subproblem whose bound is dominated by `cutoff`
    /// (spec: "the application's sense-aware dominance"), returning their
    /// ids so the caller can recycle them through the
    /// [`crate::handler::SubproblemHandler`] (decrementing token counts on
    /// their underlying shared subproblem). Iteration order is the pool's
    /// own; running `prune` twice in a row is idempotent since the second
    /// call finds nothing left to remove.
    pub fn prune(&mut self, cutoff: f64) -> Vec<SubproblemId> {
        let sense = self.sense;
        let dominated: Vec<SubproblemId> = self
            .heap
            .iter()
            .filter(|&id| sense.is_dominated(self.entries[&id].bound, cutoff))
            .collect();
        for id in &dominated {
            self.remove(*id);
        }
        dominated
    }

    /// Every member currently resident, in no particular order. Used by
    /// checkpointing (spec §4.7) to enumerate what to serialize.
    pub fn ids(&self) -> Vec<SubproblemId> {
        self.heap.iter().collect()
    }

    /// `{count, aggregateBound, minBound}`, all maintained incrementally.
    pub fn load_snapshot(&self) -> LoadSnapshot {
        if self.is_empty() {
            return LoadSnapshot::EMPTY;
        }
        let min_bound = self
            .heap
            .peek()
            .map(|id| self.entries[&id].bound)
            .unwrap_or(f64::INFINITY);
        LoadSnapshot {
            count: self.len(),
            aggregate_bound: self.aggregate_bound,
            min_bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(slot: u32) -> SubproblemId {
        SubproblemId {
            slot,
            generation: 0,
        }
    }

    #[test]
    fn select_best_picks_min_bound_for_minimization() {
        let mut pool = LocalPool::new(Sense::Min);
        pool.insert(id(0), 10.0);
        pool.insert(id(1), 5.0);
        pool.insert(id(2), 7.0);
        assert_eq!(pool.select_best(), Some(id(1)));
        assert_eq!(pool.select_best(), Some(id(2)));
        assert_eq!(pool.select_best(), Some(id(0)));
        assert_eq!(pool.select_best(), None);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut pool = LocalPool::new(Sense::Min);
        pool.insert(id(0), 5.0);
        pool.insert(id(1), 5.0);
        assert_eq!(pool.select_best(), Some(id(0)));
        assert_eq!(pool.select_best(), Some(id(1)));
    }

    #[test]
    fn prune_removes_dominated_and_is_idempotent() {
        let mut pool = LocalPool::new(Sense::Min);
        for (i, b) in [10.0, 4.0, 6.0, 6.0].into_iter().enumerate() {
            pool.insert(id(i as u32), b);
        }
        // Dominated (>= cutoff for minimization): 10.0 and both 6.0 entries.
        let removed = pool.prune(6.0);
        assert_eq!(removed.len(), 3);
        assert_eq!(pool.len(), 1);
        let again = pool.prune(6.0);
        assert!(again.is_empty());
    }
}
