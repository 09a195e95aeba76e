//! Best-known feasible solution, plus the radix-tree broadcast that keeps
//! every process's copy monotone (spec §3 `Incumbent`, §4.6).

use crate::application::Sense;
use crate::ids::ProcessId;

/// `{value, source, solutionPayload}` — monotonic in the optimization
/// sense.
#[derive(Debug, Clone)]
pub struct Incumbent<S> {
    pub value: f64,
    pub source: ProcessId,
    pub solution: S,
}

/// Tracks the locally-known incumbent and decides whether an incoming
/// candidate replaces it. Does not itself send or receive messages — the
/// runtime wires this to the worker/hub message loops with a
/// `loadBalTreeRadix`-shaped broadcast of its own (`incumbTreeRadix`).
pub struct IncumbentTracker<S> {
    sense: Sense,
    current: Option<Incumbent<S>>,
}

impl<S: Clone> IncumbentTracker<S> {
    pub fn new(sense: Sense) -> Self {
        IncumbentTracker {
            sense,
            current: None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.current.as_ref().map(|i| i.value)
    }

    pub fn get(&self) -> Option<&Incumbent<S>> {
        self.current.as_ref()
    }

    /// True iff `candidate` would actually change the tracked incumbent
    /// (strict improvement, or equal value from a lower `source` —
    /// spec §4.6's determinism tie-break).
    pub fn would_replace(&self, value: f64, source: ProcessId) -> bool {
        match &self.current {
            None => true,
            Some(cur) => {
                self.sense.strictly_improves(value, cur.value)
                    || (value == cur.value && source < cur.source)
            }
        }
    }

    /// Applies a candidate incumbent if it would replace the current one.
    /// Returns `true` on replacement — callers use this to decide whether
    /// to schedule a pool prune and re-broadcast (spec §4.6: "a
    /// non-improving message is silently dropped").
    pub fn offer(&mut self, value: f64, source: ProcessId, solution: S) -> bool {
        if !self.would_replace(value, source) {
            return false;
        }
        self.current = Some(Incumbent {
            value,
            source,
            solution,
        });
        true
    }
}

/// Splits `peers` into `radix`-sized groups for a tree broadcast/reduce,
/// mirroring `loadBalTreeRadix`/`incumbTreeRadix` fan-out.
pub fn tree_children(peers: &[ProcessId], radix: usize) -> Vec<Vec<ProcessId>> {
    if radix == 0 {
        return vec![peers.to_vec()];
    }
    peers.chunks(radix).map(|c| c.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_improvement_replaces() {
        let mut tracker: IncumbentTracker<i32> = IncumbentTracker::new(Sense::Min);
        assert!(tracker.offer(10.0, ProcessId(2), 1));
        assert!(tracker.offer(5.0, ProcessId(1), 2));
        assert_eq!(tracker.value(), Some(5.0));
        // Worse value is dropped.
        assert!(!tracker.offer(6.0, ProcessId(0), 3));
        assert_eq!(tracker.value(), Some(5.0));
    }

    #[test]
    fn tie_breaks_by_lower_source() {
        let mut tracker: IncumbentTracker<i32> = IncumbentTracker::new(Sense::Min);
        tracker.offer(5.0, ProcessId(3), 1);
        assert!(tracker.offer(5.0, ProcessId(1), 2));
        assert_eq!(tracker.get().unwrap().source, ProcessId(1));
        assert!(!tracker.offer(5.0, ProcessId(2), 3));
    }

    #[test]
    fn tree_children_chunks_by_radix() {
        let peers: Vec<ProcessId> = (0..5).map(ProcessId).collect();
        let groups = tree_children(&peers, 2);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[2].len(), 1);
    }
}
