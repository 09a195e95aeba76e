//! Hub state and operations (spec §4.4): owns a cluster of workers,
//! dispatches tokens to low-loaded workers, participates in global load
//! balancing, collects quality/load statistics, and prunes its
//! `TokenPool` on incumbent improvement.

use crate::application::Sense;
use crate::config::Config;
use crate::ids::{Address, ProcessId};
use crate::pool::TokenPool;
use crate::token::Token;

/// Per-worker bookkeeping a hub maintains (spec §4.4 state).
#[derive(Debug, Clone, Copy)]
pub struct WorkerRecord {
    pub count: usize,
    pub best_bound: f64,
    pub in_flight: usize,
    /// Last buffer size (bytes) this worker is known to have grown to,
    /// per the `spBufferWarning` protocol (spec §5 back-pressure).
    known_buf: usize,
}

impl WorkerRecord {
    fn new(sense: Sense, default_buf: usize) -> Self {
        WorkerRecord {
            count: 0,
            best_bound: sense.worst_bound(),
            in_flight: 0,
            known_buf: default_buf,
        }
    }
}

pub struct Hub {
    id: ProcessId,
    sense: Sense,
    tokens: TokenPool,
    workers: Vec<(ProcessId, WorkerRecord)>,
    rebalance_tally: u64,
    busy_fraction: f64,
    default_buf: usize,
}

impl Hub {
    pub fn new(id: ProcessId, sense: Sense, worker_ids: &[ProcessId]) -> Self {
        Hub::with_receive_buf(id, sense, worker_ids, 0)
    }

    /// Same as [`Hub::new`] but seeds every worker's assumed receive
    /// buffer size to `default_buf` (spec §6 `spReceiveBuf`) rather than
    /// zero, so the first dispatch to each worker only triggers a
    /// `spBufferWarning` if its payload genuinely exceeds that size.
    pub fn with_receive_buf(id: ProcessId, sense: Sense, worker_ids: &[ProcessId], default_buf: usize) -> Self {
        Hub {
            id,
            sense,
            tokens: TokenPool::new(sense),
            workers: worker_ids.iter().map(|&id| (id, WorkerRecord::new(sense, default_buf))).collect(),
            rebalance_tally: 0,
            busy_fraction: 0.0,
            default_buf,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Every token currently held, for checkpointing (spec §4.7).
    pub fn token_snapshot(&self) -> Vec<Token> {
        self.tokens.snapshot()
    }

    fn record_mut(&mut self, worker: ProcessId) -> &mut WorkerRecord {
        let idx = self
            .workers
            .iter()
            .position(|(id, _)| *id == worker)
            .expect("unknown worker");
        &mut self.workers[idx].1
    }

    /// `receiveReleases(worker, tokens)`: inserts tokens into the
    /// `TokenPool`, updates the worker's record, and immediately
    /// force-dispatches any overflow past `maxTokenQueuing` so the pool
    /// never sits above the cap between calls to `dispatch` (spec §6
    /// `maxTokenQueuing`, §8 scenario 2). Returns the forced dispatches for
    /// the caller to send, already marked in-flight.
    pub fn receive_releases(&mut self, worker: ProcessId, tokens: Vec<Token>, config: &Config) -> Vec<(ProcessId, Token)> {
        for token in tokens {
            self.tokens.insert(token);
        }
        self.force_dispatch_overflow(config)
    }

    /// Inserts tokens arriving from another cluster's hub via the
    /// `GlobalLoadBalancer` coordinator (spec §4.5 step 3). Unlike
    /// [`Hub::receive_releases`] these tokens name a worker this hub does
    /// not itself track, so no `WorkerRecord` is touched beyond whatever a
    /// subsequent force-dispatch assigns. Same overflow handling as
    /// `receive_releases`.
    pub fn receive_foreign_tokens(&mut self, tokens: Vec<Token>, config: &Config) -> Vec<(ProcessId, Token)> {
        for token in tokens {
            self.tokens.insert(token);
        }
        self.force_dispatch_overflow(config)
    }

    /// Pops tokens past `maxTokenQueuing` and assigns them to whichever
    /// worker currently holds the least work, ignoring the low-load filter
    /// `dispatch` otherwise applies. Shared by `dispatch` itself (steady
    /// state) and `receive_releases`/`receive_foreign_tokens` (so the cap
    /// holds immediately on arrival, not only at the next `dispatch` call).
    fn force_dispatch_overflow(&mut self, config: &Config) -> Vec<(ProcessId, Token)> {
        let mut dispatched = Vec::new();
        while self.tokens.len() > config.max_token_queuing {
            let Some(worker) = self.least_loaded_worker() else {
                break;
            };
            let Some(token) = self.tokens.remove_best() else {
                break;
            };
            self.mark_dispatched(worker, &token);
            dispatched.push((worker, token));
        }
        dispatched
    }

    /// Pops up to `n` best tokens for a cross-cluster transfer (spec §4.5
    /// step 3's "best-first" selection at the `TokenPool` level).
    pub fn take_best_tokens(&mut self, n: usize) -> Vec<Token> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            match self.tokens.remove_best() {
                Some(token) => out.push(token),
                None => break,
            }
        }
        out
    }

    /// Feeds the worker's self-reported backlog size (its `loadBlock.count`
    /// from the last `hubUpdate`, spec §4.4 state) into its record, so
    /// dispatch decisions reflect the worker's real load rather than only
    /// tokens this hub has in flight to it.
    pub fn set_worker_count(&mut self, worker: ProcessId, count: usize) {
        self.record_mut(worker).count = count;
    }

    /// `receiveAcks(worker, acks)`: clears matching in-flight records,
    /// dropping any token that has become fathomable against `incumbent`.
    pub fn receive_acks(&mut self, worker: ProcessId, acks: &[(Address, f64)], incumbent: Option<f64>) {
        let record = self.record_mut(worker);
        record.in_flight = record.in_flight.saturating_sub(acks.len());
        if let Some(incumbent) = incumbent {
            for &(address, bound) in acks {
                if self.sense.is_dominated(bound, incumbent) {
                    self.tokens.remove(address);
                }
            }
        }
    }

    /// `dispatch()`: while a worker is below `lowWorkerCount` and the pool
    /// is non-empty, pops the best token and assigns it. When
    /// `quality_balance` is enabled, prefers the worker with the worst
    /// `best_bound` among those below target (spec §4.4 "Quality
    /// balancing"). Returns `(worker, token)` pairs; the caller sends them
    /// and marks them in-flight via [`Hub::mark_dispatched`].
    pub fn dispatch(&mut self, config: &Config, target: f64) -> Vec<(ProcessId, Token)> {
        let low_count = config.low_load_fac * target;
        let mut dispatched = Vec::new();

        loop {
            let candidate = self.pick_dispatch_target(low_count, config.quality_balance);
            let Some(worker) = candidate else {
                break;
            };
            let Some(token) = self.tokens.remove_best() else {
                break;
            };
            self.mark_dispatched(worker, &token);
            dispatched.push((worker, token));
        }

        dispatched.extend(self.force_dispatch_overflow(config));
        dispatched
    }

    fn least_loaded_worker(&self) -> Option<ProcessId> {
        self.workers.iter().min_by_key(|(_, r)| r.count + r.in_flight).map(|(id, _)| *id)
    }

    fn pick_dispatch_target(&self, low_count: f64, quality_balance: bool) -> Option<ProcessId> {
        let below_target: Vec<&(ProcessId, WorkerRecord)> = self
            .workers
            .iter()
            .filter(|(_, r)| (r.count + r.in_flight) as f64 <= low_count)
            .collect();
        if below_target.is_empty() {
            return None;
        }
        if quality_balance {
            below_target
                .into_iter()
                .max_by(|(_, a), (_, b)| {
                    self.sense
                        .order_bound(b.best_bound, a.best_bound)
                })
                .map(|(id, _)| *id)
        } else {
            below_target
                .into_iter()
                .min_by_key(|(_, r)| r.count + r.in_flight)
                .map(|(id, _)| *id)
        }
    }

    /// Call immediately before sending `token`'s packed payload to `worker`.
    /// Returns the size to warn the receiver to grow to, if `token`'s
    /// packed size exceeds what that worker is last known to hold
    /// (spec §5 back-pressure / §8 scenario 6), and records the new
    /// known size so later, smaller dispatches don't re-warn.
    pub fn buffer_warning_for(&mut self, worker: ProcessId, payload_len: usize) -> Option<usize> {
        let record = self.record_mut(worker);
        if payload_len > record.known_buf {
            record.known_buf = payload_len;
            Some(payload_len)
        } else {
            None
        }
    }

    pub fn receive_buf_default(&self) -> usize {
        self.default_buf
    }

    fn mark_dispatched(&mut self, worker: ProcessId, token: &Token) {
        let record = self.record_mut(worker);
        record.in_flight += 1;
        if self.sense.strictly_improves(token.bound, record.best_bound) {
            record.best_bound = token.bound;
        }
    }

    /// `pruneOnIncumbent(newIncumbent)`: prunes the `TokenPool` and
    /// returns the dropped tokens so the caller can notify their homes.
    pub fn prune_on_incumbent(&mut self, incumbent_value: f64) -> Vec<Token> {
        self.tokens.prune(incumbent_value)
    }

    /// Computes the `workerTimeFraction` a co-resident worker should
    /// assume it gets of this process's CPU, clamped by
    /// `hub_busy_inflate`/`hub_busy_adjust` (spec §4.4 "Hub-as-worker").
    pub fn worker_time_fraction(&self, config: &Config) -> f64 {
        let raw = 1.0 - self.busy_fraction * config.hub_busy_inflate;
        (raw * config.hub_busy_adjust).clamp(0.0, 1.0)
    }

    pub fn set_busy_fraction(&mut self, fraction: f64) {
        self.busy_fraction = fraction.clamp(0.0, 1.0);
    }

    /// Whether this cluster's hub should also run a `LocalPool` of its own
    /// (spec §4.4 "Hub-as-worker"): only below `hubs_dont_work_size`.
    pub fn does_local_work(&self, config: &Config) -> bool {
        self.workers.len() <= config.hubs_dont_work_size
    }

    pub fn load_snapshot(&self) -> crate::pool::LoadSnapshot {
        self.tokens.load_snapshot()
    }

    pub fn bump_rebalance_tally(&mut self) -> u64 {
        self.rebalance_tally += 1;
        self.rebalance_tally
    }

    pub fn rebalance_tally(&self) -> u64 {
        self.rebalance_tally
    }

    /// Per-worker rows for [`crate::stats::print_worker_table`] (spec §7
    /// `workersPrintStatus`): this hub's own view of each worker's
    /// backlog and best dispatched bound.
    pub fn worker_rows(&self) -> Vec<crate::stats::WorkerRow> {
        self.workers
            .iter()
            .map(|(id, record)| crate::stats::WorkerRow {
                id: *id,
                local_count: record.count,
                best_bound: record.best_bound,
                rebalance_count: self.rebalance_tally,
            })
            .collect()
    }
}
