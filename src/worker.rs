//! Worker state and release/rebalance decisions (spec §4.3). Chomps
//! through its `LocalPool`; decides when to release tokens to its hub;
//! acknowledges dispatched subproblems; rebalances upward when overloaded.

use crate::application::{Application, Sense};
use crate::config::Config;
use crate::error::EngineError;
use crate::handler::SubproblemHandler;
use crate::ids::{Address, ProcessId, SubproblemId};
use crate::message::DeliveryAck;
use crate::pool::LocalPool;
use crate::subproblem::SubproblemArena;
use crate::token::{Token, TokenKind};

/// One process's worker-side state: its subproblem arena, its ordered
/// pool of ready work, and the counters the release/rebalance decisions
/// consult.
pub struct Worker<A: Application> {
    id: ProcessId,
    hub: ProcessId,
    sense: Sense,
    arena: SubproblemArena<A::Payload>,
    pool: LocalPool,
    current: Option<SubproblemId>,
    release_count: usize,
    created_count: u64,
    rebalance_count: u64,
    hubs_rebalance_count: u64,
    /// Last cluster-load snapshot this worker heard from its hub, used as
    /// the rebalance/scatter target.
    target: f64,
    pending_acks: Vec<DeliveryAck>,
    /// Subproblems bounded into a feasible candidate rather than split
    /// further, awaiting collection by the runtime's incumbent check.
    pending_candidates: Vec<SubproblemId>,
    /// Largest receive buffer size this process has been told to grow to
    /// via a `spBufferWarning` (spec §5 back-pressure), purely a protocol
    /// bookkeeping value — `Vec<u8>` already grows on demand.
    receive_buf: usize,
}

impl<A: Application> Worker<A> {
    pub fn new(id: ProcessId, hub: ProcessId, sense: Sense) -> Self {
        Worker {
            id,
            hub,
            sense,
            arena: SubproblemArena::new(id),
            pool: LocalPool::new(sense),
            current: None,
            release_count: 0,
            created_count: 0,
            rebalance_count: 0,
            hubs_rebalance_count: 0,
            target: 0.0,
            pending_acks: Vec::new(),
            pending_candidates: Vec::new(),
            receive_buf: 0,
        }
    }

    /// Records a `spBufferWarning`'s announced size.
    pub fn note_buffer_warning(&mut self, grow_to_at_least: usize) {
        self.receive_buf = self.receive_buf.max(grow_to_at_least);
    }

    pub fn receive_buf(&self) -> usize {
        self.receive_buf
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn local_count(&self) -> usize {
        self.pool.len()
    }

    /// Total subproblems this worker has ever created (the root plus every
    /// child `split`/`make_child` has produced), regardless of whether they
    /// are still resident. Used by ramp-up-only termination (spec §8
    /// scenario 3's `minRampUpSubprobsCreated`).
    pub fn created_count(&self) -> u64 {
        self.created_count
    }

    pub fn arena_mut(&mut self) -> &mut SubproblemArena<A::Payload> {
        &mut self.arena
    }

    pub fn arena(&self) -> &SubproblemArena<A::Payload> {
        &self.arena
    }

    /// Every subproblem id currently resident in the pool, for
    /// checkpointing (spec §4.7).
    pub fn pool_ids(&self) -> Vec<SubproblemId> {
        self.pool.ids()
    }

    /// Inserts a freshly created or received subproblem into the pool.
    pub fn insert_root(&mut self, payload: A::Payload, bound: f64) -> SubproblemId {
        let id = self.arena.insert(None, bound, payload);
        self.pool.insert(id, bound);
        self.created_count += 1;
        id
    }

    /// One pass of the main loop (spec §4.3 steps 1-4): selects the
    /// current subproblem if there isn't one, fathoms or bounds it, and on
    /// separation emits all children, handing each to `release` to decide
    /// local-vs-released. Returns `false` if the pool (and current slot)
    /// are empty — the caller should then poll its hub inbox instead.
    pub fn step(
        &mut self,
        handler: &SubproblemHandler<A>,
        work_quantum: &mut f64,
        incumbent_value: Option<f64>,
        mut release: impl FnMut(&mut Self, SubproblemId, f64) -> bool,
    ) -> Result<bool, EngineError> {
        if self.current.is_none() {
            self.current = self.pool.select_best();
        }
        let Some(id) = self.current else {
            return Ok(false);
        };

        let bound = self.arena.get(id).map(|sp| sp.bound).unwrap_or(f64::INFINITY);
        if let Some(incumbent) = incumbent_value {
            if handler.fathom_test(bound, incumbent) {
                self.arena.remove(id);
                self.current = None;
                return Ok(true);
            }
        }

        handler.bound(&mut self.arena, id, work_quantum)?;
        let state = self.arena.get(id).unwrap().state;
        if state == crate::subproblem::State::Dead {
            self.arena.remove(id);
            self.current = None;
            return Ok(true);
        }

        if handler.is_candidate(&self.arena.get(id).unwrap().payload) {
            self.pending_candidates.push(id);
            self.current = None;
            return Ok(true);
        }

        let total = handler.split(&mut self.arena, id)?;
        for _ in 0..total {
            let (_chosen, payload) = handler.make_child(&mut self.arena, id, crate::handler::ANY_CHILD)?;
            let child_bound = self.arena.get(id).unwrap().bound;
            let child_id = self.arena.insert(Some(id), child_bound, payload);
            self.release_count += 1;
            self.created_count += 1;
            let keep_local = !release(self, child_id, child_bound);
            if keep_local {
                self.pool.insert(child_id, child_bound);
            }
        }
        self.arena.try_reclaim(id);
        self.current = None;
        Ok(true)
    }

    /// Whether to release a given child rather than keep it local (spec
    /// §4.3 "Release decision"). `local_count`/`global_count` are the
    /// cluster-wide load snapshot the worker last heard about.
    pub fn should_release(&self, config: &Config, local_count: usize, global_count: usize) -> bool {
        if self.release_count <= config.init_force_releases {
            return true;
        }
        let target_fraction = config.target_fraction(config.hub_load_fac, 1.0, global_count.max(1) as f64);
        let load_ratio = if global_count == 0 {
            0.0
        } else {
            local_count as f64 / global_count as f64
        };
        let prob = scatter_probability(
            load_ratio,
            target_fraction,
            config.min_scatter_prob,
            config.target_scatter_prob,
            config.max_scatter_prob,
            config.scatter_fac,
        );
        fastrand::f64() < prob
    }

    /// Chooses where a released child's token should be sent: the
    /// worker's own hub, or (scatter) a random other hub weighted by
    /// cluster size (spec §4.3 "Hub destination").
    pub fn choose_hub_destination(
        &self,
        config: &Config,
        cluster_load_ratio: f64,
        other_hubs: &[(ProcessId, usize)],
    ) -> ProcessId {
        if other_hubs.is_empty() {
            return self.hub;
        }
        let ideal_ratio = 1.0;
        let prob = scatter_probability(
            cluster_load_ratio,
            ideal_ratio,
            config.min_non_local_scatter_prob,
            config.target_non_local_scatter_prob,
            config.max_non_local_scatter_prob,
            1.0,
        );
        if fastrand::f64() >= prob {
            return self.hub;
        }
        let total_weight: usize = other_hubs.iter().map(|(_, w)| *w).sum();
        if total_weight == 0 {
            return self.hub;
        }
        let mut pick = fastrand::usize(0..total_weight);
        for &(hub, weight) in other_hubs {
            if pick < weight {
                return hub;
            }
            pick -= weight;
        }
        self.hub
    }

    /// Whether this worker should return excess work upward right now
    /// (spec §4.3 "Rebalance"). The Open Question about gating the first
    /// rebalance is resolved in favor of allowing it when both counts are
    /// zero (DESIGN.md).
    pub fn should_rebalance(&self, config: &Config, target: f64) -> bool {
        if !config.rebalancing {
            return false;
        }
        let threshold = (config.rebal_load_fac * target).max(target + config.rebal_load_diff);
        let fence_clear = self.hubs_rebalance_count == self.rebalance_count;
        self.pool.len() as f64 > threshold && fence_clear
    }

    /// Returns excess subproblems to the hub as tokens, keeping
    /// `worker_keep_count` locally, and bumps the rebalance counter. Each
    /// returned subproblem is packed and removed from this worker's arena
    /// — a `self` token's payload travels with it (see [`Token::payload`]).
    pub fn rebalance(&mut self, config: &Config, app: &A) -> Vec<Token> {
        let mut tokens = Vec::new();
        while self.pool.len() > config.worker_keep_count {
            let Some(id) = self.pool.select_best() else {
                break;
            };
            let Some(sp) = self.arena.remove(id) else {
                continue;
            };
            tokens.push(Token {
                address: Address { home: self.id, local: id },
                bound: sp.bound,
                kind: TokenKind::SelfToken,
                multiplicity: 1,
                sequence: tokens.len() as u64,
                payload: app.pack(&sp.payload),
            });
        }
        self.rebalance_count += 1;
        tokens
    }

    /// Records an acknowledgement for the next batched hub message (spec
    /// §4.3 "Hub acknowledgements").
    pub fn record_ack(&mut self, address: Address, bound: f64) {
        self.pending_acks.push(DeliveryAck { address, bound });
    }

    pub fn drain_acks(&mut self) -> Vec<DeliveryAck> {
        std::mem::take(&mut self.pending_acks)
    }

    /// Drains ids of subproblems found to be feasible candidates since the
    /// last call. The caller is responsible for extracting the solution
    /// and removing the arena entry once it has read what it needs.
    pub fn drain_candidates(&mut self) -> Vec<SubproblemId> {
        std::mem::take(&mut self.pending_candidates)
    }

    pub fn has_pending_candidates(&self) -> bool {
        !self.pending_candidates.is_empty()
    }

    /// `{count, aggregateBound, minBound}` of this worker's `LocalPool`,
    /// used by the incumbent-heuristic pseudo-thread to judge how close
    /// the best locally-known bound is to the tracked incumbent (spec
    /// §4.8 `relativeGap`).
    pub fn load_snapshot(&self) -> crate::pool::LoadSnapshot {
        self.pool.load_snapshot()
    }

    /// Notes the cluster's rebalance counter as observed from the hub's
    /// last `hubUpdate`, clearing the synchronization fence.
    pub fn observe_hubs_rebalance_count(&mut self, count: u64) {
        self.hubs_rebalance_count = count;
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    pub fn target(&self) -> f64 {
        self.target
    }
}

/// `scatterProbability` from spec §4.3: a Bernoulli-trial probability
/// shaped by how far `load_ratio` is from `target`, clamped to
/// `[min, max]` and scaled by `scatter_fac`.
fn scatter_probability(load_ratio: f64, target: f64, min: f64, target_prob: f64, max: f64, scatter_fac: f64) -> f64 {
    if target <= 0.0 {
        return min;
    }
    let overload = (load_ratio / target - 1.0).max(0.0);
    let prob = target_prob + scatter_fac * overload * (max - target_prob);
    prob.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::BoundOutcome;
    use crate::ids::GlobalSubproblemId;
    use std::cmp::Ordering;

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
        fn bound(&self, payload: &mut i32, _q: &mut f64) -> BoundOutcome {
            BoundOutcome::Bounded(*payload as f64)
        }
        fn separate(&self, payload: &i32, _id: GlobalSubproblemId) -> Result<usize, EngineError> {
            if *payload < 1 { Ok(2) } else { Ok(0) }
        }
        fn make_child(&self, payload: &i32, which: usize) -> i32 {
            payload + 1 + which as i32
        }
        fn candidate_solution(&self, payload: &i32) -> bool {
            *payload >= 1
        }
        fn extract_solution(&self, payload: &i32) -> i32 {
            *payload
        }
        fn compare_solution(&self, a: &i32, b: &i32) -> Ordering {
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
    fn step_splits_and_emits_children_kept_local() {
        let app = ToyApp;
        let handler = SubproblemHandler::new(&app);
        let mut worker: Worker<ToyApp> = Worker::new(ProcessId(0), ProcessId(100), Sense::Min);
        worker.insert_root(0, 0.0);

        let mut quantum = 1.0;
        let did_work = worker
            .step(&handler, &mut quantum, None, |_w, _id, _bound| false)
            .unwrap();
        assert!(did_work);
        assert_eq!(worker.local_count(), 2);
    }

    #[test]
    fn init_force_releases_always_releases_early() {
        let worker: Worker<ToyApp> = Worker::new(ProcessId(0), ProcessId(100), Sense::Min);
        let config = Config::default();
        assert!(worker.should_release(&config, 0, 0));
    }

    #[test]
    fn rebalance_respects_fence_and_keep_count() {
        let mut worker: Worker<ToyApp> = Worker::new(ProcessId(0), ProcessId(100), Sense::Min);
        for i in 0..5 {
            let id = worker.insert_root(i, i as f64);
            let _ = id;
        }
        let mut config = Config::default();
        config.worker_keep_count = 1;
        assert!(worker.should_rebalance(&config, 0.0));
        let tokens = worker.rebalance(&config, &ToyApp);
        assert_eq!(tokens.len(), 4);
        assert_eq!(worker.local_count(), 1);
    }
}
