//! Applies application-supplied `bound`, `split`, `makeChild`,
//! `candidateSolution` to an owned subproblem and drives its state
//! machine (spec §4.1).

use crate::application::{Application, BoundOutcome};
use crate::error::EngineError;
use crate::ids::SubproblemId;
use crate::subproblem::{State, SubproblemArena};

/// Index used when the caller doesn't care which remaining child is
/// produced next (spec §4.1 `whichChild = anyChild`).
pub const ANY_CHILD: usize = usize::MAX;

pub struct SubproblemHandler<'a, A: Application> {
    app: &'a A,
}

impl<'a, A: Application> SubproblemHandler<'a, A> {
    pub fn new(app: &'a A) -> Self {
        SubproblemHandler { app }
    }

    /// Runs the application's bounding routine with a cooperative time
    /// quantum. On return the subproblem is `Bounded` (a valid bound was
    /// produced) or `Dead` (fathomed by the application). Consumes work
    /// from `work_quantum`.
    pub fn bound(
        &self,
        arena: &mut SubproblemArena<A::Payload>,
        id: SubproblemId,
        work_quantum: &mut f64,
    ) -> Result<(), EngineError> {
        let sp = arena
            .get_mut(id)
            .ok_or_else(|| protocol_violation(id, "bound called on missing subproblem"))?;
        if sp.state == State::Boundable {
            sp.transition(State::BeingBounded)
                .map_err(|detail| protocol_violation(id, &detail))?;
        }
        if sp.state != State::BeingBounded {
            return Err(protocol_violation(
                id,
                &format!("bound called in state {:?}", sp.state),
            ));
        }

        match self.app.bound(&mut sp.payload, work_quantum) {
            BoundOutcome::Bounded(value) => {
                sp.bound = value;
                sp.transition(State::Bounded)
                    .map_err(|detail| protocol_violation(id, &detail))
            }
            BoundOutcome::Dead => sp
                .transition(State::Dead)
                .map_err(|detail| protocol_violation(id, &detail)),
        }
    }

    /// Runs the application's separation routine. On success the
    /// subproblem becomes `Separated` with `total_children >= 1` and
    /// `children_left` initialized to that count.
    pub fn split(
        &self,
        arena: &mut SubproblemArena<A::Payload>,
        id: SubproblemId,
    ) -> Result<usize, EngineError> {
        let sp = arena
            .get(id)
            .ok_or_else(|| protocol_violation(id, "split called on missing subproblem"))?;
        let global_id = sp.id;
        let payload = sp.payload.clone();

        if sp.state != State::Bounded {
            return Err(protocol_violation(
                id,
                &format!("split called in state {:?}", sp.state),
            ));
        }

        let total = self.app.separate(&payload, global_id)?;
        if total == 0 {
            return Err(protocol_violation(id, "separate reported zero children"));
        }

        let sp = arena.get_mut(id).expect("checked above");
        sp.transition(State::BeingSeparated)
            .map_err(|detail| protocol_violation(id, &detail))?;
        sp.transition(State::Separated)
            .map_err(|detail| protocol_violation(id, &detail))?;
        sp.total_children = Some(total);
        sp.children_left = total;
        Ok(total)
    }

    /// Produces the `which_child`-th child (or, if `which_child ==
    /// ANY_CHILD`, the next remaining one in ascending order) and
    /// decrements `children_left`. Returns the new child's payload and
    /// the concrete index that was materialized.
    pub fn make_child(
        &self,
        arena: &mut SubproblemArena<A::Payload>,
        id: SubproblemId,
        which_child: usize,
    ) -> Result<(usize, A::Payload), EngineError> {
        let sp = arena
            .get_mut(id)
            .ok_or_else(|| protocol_violation(id, "make_child called on missing subproblem"))?;
        let total = sp
            .total_children
            .ok_or_else(|| protocol_violation(id, "make_child before split"))?;
        if sp.children_left == 0 {
            return Err(protocol_violation(id, "no children left to make"));
        }

        let chosen = if which_child == ANY_CHILD {
            total - sp.children_left
        } else {
            which_child
        };
        sp.children_left -= 1;
        let payload = self.app.make_child(&sp.payload, chosen);
        Ok((chosen, payload))
    }

    /// True iff the subproblem cannot improve on the incumbent (sense-aware
    /// strict dominance, spec §4.1).
    pub fn fathom_test(&self, bound: f64, incumbent_value: f64) -> bool {
        self.app.sense().is_dominated(bound, incumbent_value)
    }

    /// Whether a bounded subproblem is itself a feasible candidate
    /// solution, in which case the caller should stop before `split`
    /// rather than separate it further.
    pub fn is_candidate(&self, payload: &A::Payload) -> bool {
        self.app.candidate_solution(payload)
    }
}

fn protocol_violation(id: SubproblemId, detail: &str) -> EngineError {
    // The global id isn't known at this call site (only the arena slot
    // id); callers that have it attach it via `map_err` upstream in
    // worker/hub code. Using a placeholder origin keeps this function
    // infallible to call from contexts without an `Application` handle.
    EngineError::ProtocolViolation {
        subproblem: crate::ids::GlobalSubproblemId {
            origin: crate::ids::ProcessId(u32::MAX),
            local: id,
        },
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Sense;
    use crate::ids::{GlobalSubproblemId, ProcessId};

    struct ToyApp;
    impl Application for ToyApp {
        type Payload = i32;
        type Solution = i32;

        fn sense(&self) -> Sense {
            Sense::Min
        }
        fn root_subproblem(&self) -> i32 {
            0
        }
        fn bound(&self, payload: &mut i32, _work_quantum: &mut f64) -> BoundOutcome {
            BoundOutcome::Bounded(*payload as f64)
        }
        fn separate(&self, payload: &i32, _id: GlobalSubproblemId) -> Result<usize, EngineError> {
            if *payload < 2 { Ok(2) } else { Ok(0) }
        }
        fn make_child(&self, payload: &i32, which_child: usize) -> i32 {
            payload + 1 + which_child as i32
        }
        fn candidate_solution(&self, payload: &i32) -> bool {
            *payload >= 2
        }
        fn extract_solution(&self, payload: &i32) -> i32 {
            *payload
        }
        fn compare_solution(&self, a: &i32, b: &i32) -> std::cmp::Ordering {
            a.cmp(b)
        }
        fn pack(&self, payload: &i32) -> Vec<u8> {
            payload.to_le_bytes().to_vec()
        }
        fn unpack(&self, bytes: &[u8]) -> Result<i32, EngineError> {
            Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
        }
    }

    #[test]
    fn bound_then_split_then_make_child() {
        let app = ToyApp;
        let handler = SubproblemHandler::new(&app);
        let mut arena = SubproblemArena::new(ProcessId(0));
        let id = arena.insert(None, 0.0, 0);

        let mut quantum = 1.0;
        handler.bound(&mut arena, id, &mut quantum).unwrap();
        assert_eq!(arena.get(id).unwrap().state, State::Bounded);

        let total = handler.split(&mut arena, id).unwrap();
        assert_eq!(total, 2);

        let (chosen, payload) = handler.make_child(&mut arena, id, ANY_CHILD).unwrap();
        assert_eq!(chosen, 0);
        assert_eq!(payload, 1);
        assert_eq!(arena.get(id).unwrap().children_left, 1);
    }

    #[test]
    fn fathom_test_is_sense_aware() {
        let app = ToyApp;
        let handler = SubproblemHandler::new(&app);
        assert!(handler.fathom_test(10.0, 5.0)); // 10 cannot beat incumbent 5 when minimizing
        assert!(!handler.fathom_test(3.0, 5.0));
    }
}
