//! The narrow capability an application implements so the engine can own
//! threading and lifetime while the application stays a set of pure
//! transformations of a subproblem payload (design notes §9).

use crate::error::EngineError;
use crate::ids::GlobalSubproblemId;
use serde::{de::DeserializeOwned, Serialize};
use std::cmp::Ordering;

/// Whether the search minimizes or maximizes `bound`/incumbent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Min,
    Max,
}

impl Sense {
    /// True if `candidate` is at least as good as `incumbent` in this sense.
    pub fn improves_or_ties(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Sense::Min => candidate <= incumbent,
            Sense::Max => candidate >= incumbent,
        }
    }

    /// True if `candidate` strictly improves on `incumbent`.
    pub fn strictly_improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Sense::Min => candidate < incumbent,
            Sense::Max => candidate > incumbent,
        }
    }

    /// Sense-aware partial order used for pool ordering: `a` comes before
    /// `b` (is selected first / is "better") if its bound cannot be
    /// dominated by `b`'s.
    pub fn order_bound(self, a: f64, b: f64) -> Ordering {
        match self {
            Sense::Min => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            Sense::Max => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        }
    }

    /// True iff a subproblem with `bound` cannot possibly improve on
    /// `incumbent` (strict dominance, spec §4.1 `fathomTest`).
    pub fn is_dominated(self, bound: f64, incumbent: f64) -> bool {
        !self.strictly_improves(bound, incumbent)
    }

    /// The bound value every real bound strictly improves on: `+inf` when
    /// minimizing, `-inf` when maximizing. Used to seed trackers that start
    /// out knowing nothing (e.g. a hub's per-worker `best_bound`).
    pub fn worst_bound(self) -> f64 {
        match self {
            Sense::Min => f64::INFINITY,
            Sense::Max => f64::NEG_INFINITY,
        }
    }
}

/// Outcome of [`Application::bound`].
pub enum BoundOutcome {
    /// A valid bound was produced; the subproblem may still be split.
    Bounded(f64),
    /// The application fathomed the subproblem itself (e.g. found it
    /// infeasible); the engine discards it without consulting the
    /// incumbent.
    Dead,
}

/// The application contract the engine requires (spec §6). Implementations
/// are expected to be cheap to share by reference — the engine never
/// takes ownership of the application, only of the subproblem payloads it
/// produces.
pub trait Application: Send + Sync {
    /// Application-defined subproblem payload (arbitrary tree-node state).
    type Payload: Clone + Send;
    /// Extracted feasible solution, handed to the incumbent broadcaster.
    /// `Serialize`/`DeserializeOwned` so the runtime can carry it in an
    /// `Incumbent` wire message without the application writing its own
    /// codec (spec §3 `Incumbent.solutionPayload`).
    type Solution: Clone + Send + Serialize + DeserializeOwned;

    fn sense(&self) -> Sense;

    /// Produces the root subproblem's payload.
    fn root_subproblem(&self) -> Self::Payload;

    /// Runs the bounding routine for one work quantum. `work_quantum` is
    /// consumed by however much work was actually performed (seconds);
    /// the handler re-invokes this on the next slice if the quantum runs
    /// out before a verdict is reached, per `forceStayCurrent`.
    fn bound(&self, payload: &mut Self::Payload, work_quantum: &mut f64) -> BoundOutcome;

    /// Separates a bounded subproblem into children. Returns the number
    /// of children (`totalChildren >= 1`) or an error if the application
    /// reports a protocol violation (e.g. a negative count).
    fn separate(
        &self,
        payload: &Self::Payload,
        id: GlobalSubproblemId,
    ) -> Result<usize, EngineError>;

    /// Produces the `which_child`-th child of an already-separated
    /// subproblem.
    fn make_child(&self, payload: &Self::Payload, which_child: usize) -> Self::Payload;

    /// Whether a (typically leaf) subproblem is a feasible incumbent
    /// candidate.
    fn candidate_solution(&self, payload: &Self::Payload) -> bool;

    /// Extracts the solution payload for incumbent broadcast.
    fn extract_solution(&self, payload: &Self::Payload) -> Self::Solution;

    /// Strict weak order over solutions in the optimization sense (used
    /// only for diagnostics / tie-break; incumbent replacement itself
    /// goes through `Sense::*` on the scalar value).
    fn compare_solution(&self, a: &Self::Solution, b: &Self::Solution) -> Ordering;

    /// Serializes a payload for inter-process transport or checkpointing.
    fn pack(&self, payload: &Self::Payload) -> Vec<u8>;

    /// Deserializes a payload packed by [`Application::pack`].
    fn unpack(&self, bytes: &[u8]) -> Result<Self::Payload, EngineError>;
}
