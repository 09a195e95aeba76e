//! Subproblem representation and the per-process arena that owns it
//! (spec §3, design notes' arena strategy).

use crate::ids::{GlobalSubproblemId, ProcessId, SubproblemId};

/// A subproblem's position in its own state machine (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Blank,
    Boundable,
    BeingBounded,
    Bounded,
    BeingSeparated,
    Separated,
    Dead,
}

impl State {
    /// Legal direct transitions, including the fathoming shortcuts from
    /// `Bounded`/`BeingBounded` to `Dead`.
    pub fn can_transition_to(self, next: State) -> bool {
        use State::*;
        matches!(
            (self, next),
            (Blank, Boundable)
                | (Boundable, BeingBounded)
                | (BeingBounded, Bounded)
                | (BeingBounded, Dead)
                | (Bounded, BeingSeparated)
                | (Bounded, Dead)
                | (BeingSeparated, Separated)
                | (Separated, Dead)
        )
    }
}

/// A node in the branch-and-bound tree, owned by exactly one process
/// (the one that allocated it in its [`SubproblemArena`]).
pub struct Subproblem<P> {
    pub id: GlobalSubproblemId,
    pub parent: Option<SubproblemId>,
    pub bound: f64,
    pub state: State,
    pub total_children: Option<usize>,
    pub children_left: usize,
    pub token_count: u32,
    pub payload: P,
    /// Insertion sequence, used only to break ties deterministically in
    /// pool ordering.
    pub sequence: u64,
}

impl<P> Subproblem<P> {
    /// True once a subproblem can be dropped from the arena: fully
    /// separated with no outstanding children, no outstanding tokens, and
    /// (checked by the caller) not referenced by any pool.
    pub fn is_reclaimable(&self) -> bool {
        self.children_left == 0 && self.token_count == 0
    }

    pub fn transition(&mut self, next: State) -> Result<(), String> {
        if !self.state.can_transition_to(next) {
            return Err(format!("illegal transition {:?} -> {:?}", self.state, next));
        }
        self.state = next;
        Ok(())
    }
}

struct Slot<P> {
    generation: u32,
    occupied: Option<Subproblem<P>>,
}

/// Arena of subproblems local to one process. Ids index directly into
/// `slots`; a generation counter on each slot lets the arena detect a
/// stale id pointing at a reused, since-reclaimed slot instead of
/// silently aliasing a different subproblem.
pub struct SubproblemArena<P> {
    owner: ProcessId,
    slots: Vec<Slot<P>>,
    free_list: Vec<u32>,
    next_sequence: u64,
}

impl<P> SubproblemArena<P> {
    pub fn new(owner: ProcessId) -> Self {
        SubproblemArena {
            owner,
            slots: Vec::new(),
            free_list: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Inserts a freshly created subproblem and returns its id. It starts
    /// life already `Boundable` — every subproblem the arena hands out is
    /// by construction ready for the handler's next `bound` call, whether
    /// it arrived via the root, a split's child, or a token delivery.
    pub fn insert(&mut self, parent: Option<SubproblemId>, bound: f64, payload: P) -> SubproblemId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let sp = |id: SubproblemId| Subproblem {
            id: GlobalSubproblemId {
                origin: self.owner,
                local: id,
            },
            parent,
            bound,
            state: State::Boundable,
            total_children: None,
            children_left: 0,
            token_count: 0,
            payload,
            sequence,
        };

        if let Some(slot_idx) = self.free_list.pop() {
            let slot = &mut self.slots[slot_idx as usize];
            let id = SubproblemId {
                slot: slot_idx,
                generation: slot.generation,
            };
            slot.occupied = Some(sp(id));
            id
        } else {
            let slot_idx = self.slots.len() as u32;
            let id = SubproblemId {
                slot: slot_idx,
                generation: 0,
            };
            self.slots.push(Slot {
                generation: 0,
                occupied: Some(sp(id)),
            });
            id
        }
    }

    pub fn get(&self, id: SubproblemId) -> Option<&Subproblem<P>> {
        let slot = self.slots.get(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.occupied.as_ref()
    }

    pub fn get_mut(&mut self, id: SubproblemId) -> Option<&mut Subproblem<P>> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.occupied.as_mut()
    }

    /// Removes and returns the subproblem at `id` if it exists. The slot's
    /// generation is bumped so any stale id pointing at it now misses.
    pub fn remove(&mut self, id: SubproblemId) -> Option<Subproblem<P>> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let removed = slot.occupied.take();
        if removed.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(id.slot);
        }
        removed
    }

    /// Drops a subproblem only if [`Subproblem::is_reclaimable`] holds;
    /// returns whether it was actually removed.
    pub fn try_reclaim(&mut self, id: SubproblemId) -> bool {
        let reclaimable = self.get(id).is_some_and(Subproblem::is_reclaimable);
        if reclaimable {
            self.remove(id);
        }
        reclaimable
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_id_after_remove_is_rejected() {
        let mut arena: SubproblemArena<i32> = SubproblemArena::new(ProcessId(0));
        let id = arena.insert(None, 1.0, 42);
        arena.remove(id);
        assert!(arena.get(id).is_none());

        let reused = arena.insert(None, 2.0, 7);
        assert_eq!(reused.slot, id.slot);
        assert_ne!(reused.generation, id.generation);
        assert!(arena.get(id).is_none());
        assert!(arena.get(reused).is_some());
    }

    #[test]
    fn reclaim_respects_outstanding_refs() {
        let mut arena: SubproblemArena<i32> = SubproblemArena::new(ProcessId(0));
        let id = arena.insert(None, 1.0, 1);
        arena.get_mut(id).unwrap().token_count = 1;
        assert!(!arena.try_reclaim(id));
        arena.get_mut(id).unwrap().token_count = 0;
        assert!(arena.try_reclaim(id));
        assert!(arena.get(id).is_none());
    }
}
