//! Process and subproblem identifiers.
//!
//! Subproblems never hold pointers to one another. Every cross-reference —
//! parent edges, token home addresses, pool membership — goes through one
//! of these small `Copy` ids, resolved against a [`crate::subproblem::SubproblemArena`]
//! local to the owning process. This is the arena strategy called for in
//! the design notes: it keeps the branch-and-bound tree free of cycles
//! while giving O(1) navigation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one process in the scheduler's hub/worker topology.
///
/// A "process" here is one OS thread running a [`crate::scheduler::CooperativeScheduler`];
/// see the runtime module for why a thread is a faithful stand-in for the
/// original MPI rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Locally-unique subproblem id: an arena slot index plus a generation
/// counter, so a stale id referring to a destroyed-and-reused slot is
/// detectable rather than silently aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubproblemId {
    pub slot: u32,
    pub generation: u32,
}

impl fmt::Display for SubproblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sp{}.{}", self.slot, self.generation)
    }
}

/// Globally-unique subproblem identity: the originating process plus the
/// id it was assigned there. Matches spec's `id` attribute
/// (originating-process id + local counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalSubproblemId {
    pub origin: ProcessId,
    pub local: SubproblemId,
}

impl fmt::Display for GlobalSubproblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.local)
    }
}

/// A handle valid only on a specific `homeProcessor`, as held by a token.
/// Opaque to every process except the one named in `home`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub home: ProcessId,
    pub local: SubproblemId,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.home)
    }
}
