//! Wires `Config`, `Application`, pools, and the message fabric together
//! into the top-level hub/worker data flow (spec §2, §4). "Process" is a
//! Rust thread; "message fabric" is `crossbeam_channel` — see SPEC_FULL §5
//! for why that is a faithful substitution for the original's MPI ranks.
//! Each worker thread runs its own [`CooperativeScheduler`] (spec §4.8);
//! more than one hub is coordinated by a [`GlobalLoadBalancer`]-style
//! thread built on `load_balancer.rs` (spec §4.5); `checkpoint.rs` backs
//! the `run_until_checkpoint`/`restart_from_checkpoint` entry points
//! (spec §4.7).

use crate::application::{Application, Sense};
use crate::checkpoint::{self, CheckpointHeader, ProcessSnapshot};
use crate::config::Config;
use crate::error::{EngineError, ExitCode};
use crate::handler::SubproblemHandler;
use crate::hub::Hub;
use crate::ids::{Address, ProcessId};
use crate::incumbent::IncumbentTracker;
use crate::message::{IncumbentMessage, LoadBlock, Message};
use crate::registry::Registry;
use crate::scheduler::{CooperativeScheduler, Schedulable, ThreadKind};
use crate::token::{Token, TokenKind};
use crate::worker::Worker;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Result of a completed engine run.
pub struct EngineOutcome<S> {
    pub incumbent: Option<(f64, ProcessId, S)>,
    pub exit_code: ExitCode,
    pub subproblems_explored: usize,
}

/// Owns the top-level run loop for one search. Holds the `Application` by
/// `Arc` since worker threads each need a reference to it.
pub struct Engine<A: Application + 'static> {
    app: Arc<A>,
    config: Config,
}

/// How long a worker or hub with nothing to do backs off before polling
/// its inbox again.
const IDLE_POLL: Duration = Duration::from_micros(200);
/// Consecutive all-idle rounds a hub (or the multi-cluster coordinator)
/// waits for before declaring termination (spec §4.5's tree-reduction
/// detection).
const IDLE_ROUNDS_TO_TERMINATE: u32 = 3;

impl<A: Application + 'static> Engine<A> {
    pub fn new(app: A, config: Config) -> Self {
        Engine {
            app: Arc::new(app),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the search to completion and returns the final incumbent (if
    /// any) plus the exit code (spec §6).
    pub fn run(&self) -> EngineOutcome<A::Solution> {
        if self.config.cluster_size <= 1 {
            return self.run_single_process();
        }
        if self.config.num_clusters > 1 {
            return self.run_multi_cluster();
        }
        self.run_single_cluster(None, None, None)
    }

    /// Degenerate single-process case (spec §8 scenario 1): one worker
    /// with no hub at all, since a lone process has nowhere to release
    /// work to.
    fn run_single_process(&self) -> EngineOutcome<A::Solution> {
        let id = ProcessId(0);
        let handler = SubproblemHandler::new(self.app.as_ref());
        let mut worker: Worker<A> = Worker::new(id, id, self.app.sense());
        worker.insert_root(self.app.root_subproblem(), f64::NEG_INFINITY);

        let mut tracker: IncumbentTracker<A::Solution> = IncumbentTracker::new(self.app.sense());
        let mut explored = 0usize;
        let mut quantum = self.config.time_slice;

        loop {
            let incumbent_value = tracker.value();
            let did_work = worker
                .step(&handler, &mut quantum, incumbent_value, |_w, _id, _bound| false)
                .expect("single-process run hit a protocol violation");
            if !did_work {
                break;
            }
            explored += 1;
            collect_candidates(&mut worker, self.app.as_ref(), &mut tracker, &self.config);
        }

        EngineOutcome {
            incumbent: tracker
                .get()
                .map(|inc| (inc.value, inc.source, inc.solution.clone())),
            exit_code: ExitCode::Normal,
            subproblems_explored: explored,
        }
    }

    /// Full hub/worker threaded model for one cluster (spec §4.3/§4.4):
    /// one hub thread and `cluster_size` worker threads, connected by
    /// `crossbeam_channel` pairs. Release, dispatch, and incumbent
    /// broadcast follow spec §4; the one documented simplification is
    /// that a released token carries its packed payload straight to the
    /// hub rather than the hub pulling it back from the origin worker on
    /// dispatch (DESIGN.md).
    ///
    /// `checkpoint` (when set) has the hub stop the search once
    /// `stop_after_explored` subproblems have been counted and write
    /// every process's [`ProcessSnapshot`]; `seed_items`/`seed_incumbent`
    /// (when set) seed a restart from a prior checkpoint instead of the
    /// application's root subproblem.
    fn run_single_cluster(
        &self,
        checkpoint: Option<CheckpointSpec>,
        seed_items: Option<Vec<(f64, Vec<u8>)>>,
        seed_incumbent: Option<(f64, ProcessId, Vec<u8>)>,
    ) -> EngineOutcome<A::Solution> {
        let hub_id = ProcessId(0);
        let num_workers = self.config.cluster_size;
        let worker_ids: Vec<ProcessId> = (1..=num_workers as u32).map(ProcessId).collect();

        let (to_hub_tx, to_hub_rx) = crossbeam_channel::unbounded::<(ProcessId, Message)>();
        let mut to_worker_tx: HashMap<ProcessId, crossbeam_channel::Sender<Message>> = HashMap::new();
        let mut worker_inboxes = Vec::new();
        for &wid in &worker_ids {
            let (tx, rx) = crossbeam_channel::unbounded::<Message>();
            to_worker_tx.insert(wid, tx);
            worker_inboxes.push((wid, rx));
        }

        let seeds: Vec<WorkerSeed> = match seed_items {
            Some(items) => distribute_seed(items, worker_ids.len()),
            None => (0..worker_ids.len())
                .map(|idx| if idx == 0 { WorkerSeed::Root } else { WorkerSeed::None })
                .collect(),
        };
        let checkpoint_dir_seq = checkpoint.as_ref().map(|c| (c.dir.clone(), c.sequence));

        let explored_total = Arc::new(AtomicUsize::new(0));
        let created_total = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();
        for ((wid, inbox), seed) in worker_inboxes.into_iter().zip(seeds) {
            let app = Arc::clone(&self.app);
            let config = self.config.clone();
            let outbox = to_hub_tx.clone();
            let explored = Arc::clone(&explored_total);
            let created = Arc::clone(&created_total);
            let checkpoint_dir_seq = checkpoint_dir_seq.clone();
            let seed_incumbent = seed_incumbent.clone();
            handles.push(thread::spawn(move || {
                run_worker_thread(
                    wid,
                    hub_id,
                    app,
                    config,
                    inbox,
                    outbox,
                    explored,
                    created,
                    seed,
                    checkpoint_dir_seq,
                    seed_incumbent,
                )
            }));
        }
        drop(to_hub_tx);

        let incumbent = run_hub_thread(
            hub_id,
            &worker_ids,
            Arc::clone(&self.app),
            self.config.clone(),
            to_hub_rx,
            to_worker_tx,
            Arc::clone(&created_total),
            Arc::clone(&explored_total),
            checkpoint,
            None,
            seed_incumbent,
        );

        let mut solution = None;
        for handle in handles {
            if let Ok(Some(result)) = handle.join() {
                solution = Some(result);
            }
        }

        // Ramp-up-only mode (spec §8 scenario 3): the tree is grown but
        // never fully searched, so whatever incumbent happened to surface
        // is discarded in favor of reporting it as unknown.
        let final_incumbent = if self.config.ramp_up_only {
            None
        } else {
            match (incumbent, solution) {
                (Some((value, source, _payload)), Some(solution)) => Some((value, source, solution)),
                _ => None,
            }
        };

        EngineOutcome {
            incumbent: final_incumbent,
            exit_code: ExitCode::Normal,
            subproblems_explored: explored_total.load(Ordering::Acquire),
        }
    }

    /// Multiple clusters, each with its own hub thread, coordinated by one
    /// `GlobalLoadBalancer` thread built on `load_balancer.rs` (spec §4.5):
    /// cluster loads reduce up to the coordinator, which plans donor ->
    /// receiver transfers and relays incumbent improvements between
    /// clusters. Checkpointing is not wired for this path (DESIGN.md); use
    /// a single cluster with `num_clusters == 1` to checkpoint/restart.
    fn run_multi_cluster(&self) -> EngineOutcome<A::Solution> {
        let num_clusters = self.config.num_clusters.max(1);
        let cluster_size = self.config.cluster_size.max(1);
        let hub_ids: Vec<ProcessId> = (0..num_clusters as u32).map(ProcessId).collect();
        let sense = self.app.sense();

        let (coord_in_tx, coord_in_rx) = crossbeam_channel::unbounded::<(ProcessId, CoordinatorInbound)>();
        let mut coord_out_txs: HashMap<ProcessId, crossbeam_channel::Sender<CoordinatorOutbound>> = HashMap::new();
        let mut coord_out_rxs: HashMap<ProcessId, crossbeam_channel::Receiver<CoordinatorOutbound>> = HashMap::new();
        for &hid in &hub_ids {
            let (tx, rx) = crossbeam_channel::unbounded::<CoordinatorOutbound>();
            coord_out_txs.insert(hid, tx);
            coord_out_rxs.insert(hid, rx);
        }

        let explored_total = Arc::new(AtomicUsize::new(0));
        let created_total = Arc::new(AtomicU64::new(0));
        let mut cluster_handles = Vec::new();
        let mut next_worker_id = num_clusters as u32;

        for (cluster_idx, &hub_id) in hub_ids.iter().enumerate() {
            let worker_ids: Vec<ProcessId> = (0..cluster_size)
                .map(|_| {
                    let wid = ProcessId(next_worker_id);
                    next_worker_id += 1;
                    wid
                })
                .collect();

            let (to_hub_tx, to_hub_rx) = crossbeam_channel::unbounded::<(ProcessId, Message)>();
            let mut to_worker_tx: HashMap<ProcessId, crossbeam_channel::Sender<Message>> = HashMap::new();
            let mut worker_inboxes = Vec::new();
            for &wid in &worker_ids {
                let (tx, rx) = crossbeam_channel::unbounded::<Message>();
                to_worker_tx.insert(wid, tx);
                worker_inboxes.push((wid, rx));
            }

            let mut worker_handles = Vec::new();
            for (idx, (wid, inbox)) in worker_inboxes.into_iter().enumerate() {
                let app = Arc::clone(&self.app);
                let config = self.config.clone();
                let outbox = to_hub_tx.clone();
                let explored = Arc::clone(&explored_total);
                let created = Arc::clone(&created_total);
                let seed = if cluster_idx == 0 && idx == 0 {
                    WorkerSeed::Root
                } else {
                    WorkerSeed::None
                };
                worker_handles.push(thread::spawn(move || {
                    run_worker_thread(wid, hub_id, app, config, inbox, outbox, explored, created, seed, None, None)
                }));
            }
            drop(to_hub_tx);

            let app = Arc::clone(&self.app);
            let config = self.config.clone();
            let explored = Arc::clone(&explored_total);
            let created = Arc::clone(&created_total);
            let link = CoordinatorLink {
                to_coordinator: coord_in_tx.clone(),
                from_coordinator: coord_out_rxs.remove(&hub_id).expect("coordinator receiver registered per hub"),
            };
            let hub_handle = thread::spawn(move || {
                run_hub_thread(
                    hub_id,
                    &worker_ids,
                    app,
                    config,
                    to_hub_rx,
                    to_worker_tx,
                    created,
                    explored,
                    None,
                    Some(link),
                    None,
                )
            });

            cluster_handles.push((hub_handle, worker_handles));
        }
        drop(coord_in_tx);

        let coordinator_handle = {
            let config = self.config.clone();
            let hub_ids_for_coord = hub_ids.clone();
            thread::spawn(move || run_coordinator(hub_ids_for_coord, config, sense, coord_in_rx, coord_out_txs))
        };

        let mut best_hub_result: Option<(f64, ProcessId, Vec<u8>)> = None;
        let mut solution: Option<A::Solution> = None;
        for (hub_handle, worker_handles) in cluster_handles {
            if let Ok(Some(result)) = hub_handle.join() {
                best_hub_result = Some(match best_hub_result {
                    None => result,
                    Some(existing) => {
                        if sense.strictly_improves(result.0, existing.0) || (result.0 == existing.0 && result.1 < existing.1) {
                            result
                        } else {
                            existing
                        }
                    }
                });
            }
            for wh in worker_handles {
                if let Ok(Some(sol)) = wh.join() {
                    solution = Some(sol);
                }
            }
        }
        let _ = coordinator_handle.join();

        let final_incumbent = if self.config.ramp_up_only {
            None
        } else {
            match (best_hub_result, solution) {
                (Some((value, source, _payload)), Some(solution)) => Some((value, source, solution)),
                _ => None,
            }
        };

        EngineOutcome {
            incumbent: final_incumbent,
            exit_code: ExitCode::Normal,
            subproblems_explored: explored_total.load(Ordering::Acquire),
        }
    }

    /// Runs until `stop_after_explored` subproblems have been explored,
    /// has every process write a [`ProcessSnapshot`] under
    /// `config().checkpoint_dir`, and writes the `ckpt.<sequence>.complete`
    /// barrier once all of them have landed (spec §4.7, §8 scenario 5).
    /// Requires `cluster_size > 1` since checkpointing needs a hub to
    /// relay the barrier.
    pub fn run_until_checkpoint(&self, stop_after_explored: usize, sequence: u64) -> Result<(), EngineError> {
        if self.config.cluster_size <= 1 {
            return Err(EngineError::IncompleteCheckpoint {
                sequence,
                detail: "checkpointing requires cluster_size > 1".to_string(),
            });
        }
        let dir = self.config.checkpoint_dir.clone();
        let spec = CheckpointSpec {
            dir: dir.clone(),
            sequence,
            stop_after_explored,
        };
        let _ = self.run_single_cluster(Some(spec), None, None);

        let mut all_ids = vec![ProcessId(0)];
        all_ids.extend((1..=self.config.cluster_size as u32).map(ProcessId));
        if !checkpoint::all_processes_present(&dir, sequence, &all_ids) {
            return Err(EngineError::IncompleteCheckpoint {
                sequence,
                detail: "not every process wrote a checkpoint file".to_string(),
            });
        }
        checkpoint::mark_complete(&dir, sequence)
    }

    /// Restarts a search from a checkpoint previously completed by
    /// [`Engine::run_until_checkpoint`] (spec §4.7 "Restart"). Every
    /// process's snapshot is read and combined into one seed set, then
    /// redistributed round-robin across `config.cluster_size` workers —
    /// which doubles as the "reconfigure" redistribution when the new
    /// cluster size differs from the checkpointed one. When
    /// `config.reconfigure` is unset the cluster size must match the
    /// checkpointed run's, mirroring the literal "each process reads only
    /// its own file" restart.
    pub fn restart_from_checkpoint(app: A, config: Config, sequence: u64) -> Result<EngineOutcome<A::Solution>, EngineError> {
        let dir = config.checkpoint_dir.clone();
        if !checkpoint::is_complete(&dir, sequence) {
            return Err(EngineError::IncompleteCheckpoint {
                sequence,
                detail: format!("{dir:?} has no complete marker for sequence {sequence}"),
            });
        }

        let snapshots = load_all_snapshots(&dir, sequence)?;
        let worker_snapshot_count = snapshots.iter().filter(|s| s.header.process_id != ProcessId(0)).count();
        if !config.reconfigure && worker_snapshot_count != config.cluster_size {
            return Err(EngineError::IncompleteCheckpoint {
                sequence,
                detail: format!(
                    "checkpoint has {worker_snapshot_count} worker snapshots but cluster_size is {} and reconfigure is off",
                    config.cluster_size
                ),
            });
        }

        let sense = app.sense();
        let seed_items = combine_seed_items(&snapshots);
        let seed_incumbent = combine_incumbent(&snapshots, sense);

        let engine = Engine::new(app, config);
        Ok(engine.run_single_cluster(None, Some(seed_items), seed_incumbent))
    }
}

/// What a freshly spawned worker thread should seed its pool with.
enum WorkerSeed {
    /// The application's root subproblem (a fresh, non-restarted run).
    Root,
    /// Subproblems recovered from a checkpoint, `(bound, packed payload)`.
    Items(Vec<(f64, Vec<u8>)>),
    /// Nothing — this worker waits for deliveries from its hub.
    None,
}

/// Round-robins a restart's combined seed items across `num_workers`
/// per-worker buckets (spec §4.7 "reconfigure").
fn distribute_seed(items: Vec<(f64, Vec<u8>)>, num_workers: usize) -> Vec<WorkerSeed> {
    let num_workers = num_workers.max(1);
    let mut buckets: Vec<Vec<(f64, Vec<u8>)>> = (0..num_workers).map(|_| Vec::new()).collect();
    for (idx, item) in items.into_iter().enumerate() {
        buckets[idx % num_workers].push(item);
    }
    buckets.into_iter().map(WorkerSeed::Items).collect()
}

/// Tells the hub thread to stop the search once `stop_after_explored`
/// subproblems have been counted and write a checkpoint (spec §4.7).
#[derive(Clone)]
struct CheckpointSpec {
    dir: PathBuf,
    sequence: u64,
    stop_after_explored: usize,
}

/// Drains any subproblems `step` marked as feasible candidates, offers
/// each to `tracker`, then removes it from the arena (no outstanding
/// children or tokens — it was never split). Used only by the
/// unthreaded single-process path; the threaded path does the same work
/// inside [`IncumbentHeuristicThread`].
fn collect_candidates<A: Application>(
    worker: &mut Worker<A>,
    app: &A,
    tracker: &mut IncumbentTracker<A::Solution>,
    config: &Config,
) {
    let candidates = worker.drain_candidates();
    for sp_id in candidates {
        let found = worker
            .arena_mut()
            .get(sp_id)
            .map(|sp| (sp.bound, app.extract_solution(&sp.payload)));
        if let Some((value, solution)) = found {
            let id = worker.id();
            if tracker.offer(value, id, solution) && config.track_incumbent {
                crate::stats::log_incumbent_improvement(value, id);
            }
        }
        worker.arena_mut().remove(sp_id);
    }
}

/// Per-worker-thread state shared between its cooperatively scheduled
/// pseudo-threads (spec §4.8). One `CooperativeScheduler` runs per
/// process; there is never real concurrency within it, so `Rc<RefCell<_>>`
/// is the right sharing tool rather than a lock.
struct WorkerCtx<A: Application> {
    app: Arc<A>,
    id: ProcessId,
    config: Config,
    worker: Worker<A>,
    tracker: IncumbentTracker<A::Solution>,
    to_release: Vec<Token>,
    best_solution: Option<A::Solution>,
    outbox: crossbeam_channel::Sender<(ProcessId, Message)>,
    explored: Arc<AtomicUsize>,
    created_total: Arc<AtomicU64>,
    last_created: u64,
    /// Most recent cluster-wide subproblem count heard from the hub's
    /// `HubBroadcast` (spec §4.3's `globalCount` input to the release
    /// decision); `0` until the first broadcast arrives.
    cluster_count: usize,
    error: Option<EngineError>,
}

/// The worker's main pseudo-thread: advances the search one `step` per
/// `execute` (spec §4.3). Registered last so ties in
/// [`CooperativeScheduler::pick_next`] favor it over the incumbent
/// heuristic.
struct MainWorkerThread<A: Application> {
    ctx: Rc<RefCell<WorkerCtx<A>>>,
}

impl<A: Application> Schedulable for MainWorkerThread<A> {
    fn kind(&self) -> ThreadKind {
        ThreadKind::Worker
    }

    fn bias(&self) -> f64 {
        self.ctx.borrow().config.worker_thread_bias
    }

    fn execute(&mut self, control_param: f64) -> bool {
        let mut ctx = self.ctx.borrow_mut();
        if ctx.error.is_some() {
            return false;
        }

        let app_clone = Arc::clone(&ctx.app);
        let handler = SubproblemHandler::new(app_clone.as_ref());
        let incumbent_value = ctx.tracker.value();
        let local_count_before = ctx.worker.local_count();
        let global_count_before = ctx.cluster_count.max(local_count_before + 1);
        let mut quantum = control_param;

        let WorkerCtx { worker, config, to_release, .. } = &mut *ctx;
        let step_result = worker.step(&handler, &mut quantum, incumbent_value, |w, child_id, bound| {
            let should_release = w.should_release(config, local_count_before, global_count_before);
            if should_release {
                // Self token: the whole subproblem migrates, packed at
                // release time rather than lazily at dispatch (DESIGN.md).
                if let Some(sp) = w.arena_mut().remove(child_id) {
                    to_release.push(Token {
                        address: Address { home: w.id(), local: child_id },
                        bound,
                        kind: TokenKind::SelfToken,
                        multiplicity: 1,
                        sequence: to_release.len() as u64,
                        payload: app_clone.pack(&sp.payload),
                    });
                }
            }
            should_release
        });

        match step_result {
            Ok(did_work) => {
                if did_work {
                    ctx.explored.fetch_add(1, Ordering::Relaxed);
                }
                let now_created = ctx.worker.created_count();
                if now_created > ctx.last_created {
                    ctx.created_total.fetch_add(now_created - ctx.last_created, Ordering::Relaxed);
                    ctx.last_created = now_created;
                }
                did_work
            }
            Err(e) => {
                ctx.error = Some(e);
                false
            }
        }
    }
}

/// The incumbent-heuristic pseudo-thread (spec §4.8): collects feasible
/// candidates the main thread found, offers them to the local tracker,
/// and broadcasts an improvement to the hub. Its bias rises as the gap
/// between the best locally-known bound and the tracked incumbent grows,
/// via [`crate::scheduler::incumbent_thread_bias`].
struct IncumbentHeuristicThread<A: Application> {
    ctx: Rc<RefCell<WorkerCtx<A>>>,
}

impl<A: Application> Schedulable for IncumbentHeuristicThread<A> {
    fn kind(&self) -> ThreadKind {
        ThreadKind::IncumbentHeuristic
    }

    fn bias(&self) -> f64 {
        let ctx = self.ctx.borrow();
        if ctx.error.is_some() || !ctx.worker.has_pending_candidates() {
            return 0.0;
        }
        let gap = relative_gap(ctx.tracker.value(), ctx.worker.load_snapshot());
        crate::scheduler::incumbent_thread_bias(
            gap,
            ctx.config.inc_thread_bias_factor,
            ctx.config.inc_thread_bias_power,
            ctx.config.inc_thread_min_bias,
            ctx.config.inc_thread_max_bias,
            ctx.config.no_incumbent_min_bias,
        )
    }

    fn execute(&mut self, _control_param: f64) -> bool {
        let mut ctx = self.ctx.borrow_mut();
        if ctx.error.is_some() {
            return false;
        }
        let app_clone = Arc::clone(&ctx.app);
        let id = ctx.id;
        let candidates = ctx.worker.drain_candidates();
        let any = !candidates.is_empty();

        for sp_id in candidates {
            let found = ctx
                .worker
                .arena_mut()
                .get(sp_id)
                .map(|sp| (sp.bound, app_clone.extract_solution(&sp.payload)));
            if let Some((value, solution)) = found {
                if ctx.tracker.offer(value, id, solution.clone()) {
                    if ctx.config.track_incumbent {
                        crate::stats::log_incumbent_improvement(value, id);
                    }
                    let payload = bincode::serialize(&solution).unwrap_or_default();
                    let _ = ctx
                        .outbox
                        .send((id, Message::Incumbent(IncumbentMessage { value, source: id, payload })));
                }
            }
            ctx.worker.arena_mut().remove(sp_id);
        }

        if let Some(inc) = ctx.tracker.get() {
            if inc.source == id {
                ctx.best_solution = Some(inc.solution.clone());
            }
        }
        any
    }
}

/// `relativeGap` from spec §4.8: how far the worker's best-known local
/// bound is from the tracked incumbent, normalized by the incumbent's
/// magnitude. `None` while there is no incumbent yet or nothing local to
/// compare against.
fn relative_gap(incumbent: Option<f64>, snapshot: crate::pool::LoadSnapshot) -> Option<f64> {
    let incumbent = incumbent?;
    if snapshot.count == 0 {
        return None;
    }
    let gap = (incumbent - snapshot.min_bound).abs();
    Some(gap / incumbent.abs().max(1.0))
}

fn run_worker_thread<A: Application>(
    id: ProcessId,
    hub_id: ProcessId,
    app: Arc<A>,
    config: Config,
    inbox: crossbeam_channel::Receiver<Message>,
    outbox: crossbeam_channel::Sender<(ProcessId, Message)>,
    explored: Arc<AtomicUsize>,
    created_total: Arc<AtomicU64>,
    seed: WorkerSeed,
    checkpoint_dir_seq: Option<(PathBuf, u64)>,
    seed_incumbent: Option<(f64, ProcessId, Vec<u8>)>,
) -> Option<A::Solution> {
    let registry = Registry::new(app.as_ref());
    let mut worker: Worker<A> = Worker::new(id, hub_id, app.sense());
    let mut tracker: IncumbentTracker<A::Solution> = IncumbentTracker::new(app.sense());
    if let Some((value, source, payload)) = &seed_incumbent {
        if let Ok(solution) = bincode::deserialize::<A::Solution>(payload) {
            tracker.offer(*value, *source, solution);
        }
    }

    let mut last_created = 0u64;
    match seed {
        WorkerSeed::Root => {
            worker.insert_root(app.root_subproblem(), f64::NEG_INFINITY);
            last_created = worker.created_count();
            created_total.fetch_add(last_created, Ordering::Relaxed);
        }
        WorkerSeed::Items(items) => {
            for (bound, packed) in items {
                if let Ok(payload) = app.unpack(&packed) {
                    worker.insert_root(payload, bound);
                }
            }
            last_created = worker.created_count();
            created_total.fetch_add(last_created, Ordering::Relaxed);
        }
        WorkerSeed::None => {}
    }

    let ctx = Rc::new(RefCell::new(WorkerCtx {
        app: Arc::clone(&app),
        id,
        config: config.clone(),
        worker,
        tracker,
        to_release: Vec::new(),
        best_solution: None,
        outbox: outbox.clone(),
        explored: Arc::clone(&explored),
        created_total: Arc::clone(&created_total),
        last_created,
        cluster_count: 0,
        error: None,
    }));

    let mut scheduler = CooperativeScheduler::new(config.time_slice);
    if config.use_incumbent_thread {
        scheduler.register(Box::new(IncumbentHeuristicThread { ctx: Rc::clone(&ctx) }));
    }
    scheduler.register(Box::new(MainWorkerThread { ctx: Rc::clone(&ctx) }));

    loop {
        if config.ramp_up_only && created_total.load(Ordering::Relaxed) >= config.min_ramp_up_subprobs_created as u64 {
            return ctx.borrow().best_solution.clone();
        }

        let mut stop = false;
        while let Ok(msg) = inbox.try_recv() {
            match msg {
                Message::Abort { .. } => {
                    stop = true;
                }
                Message::CheckpointBarrier { sequence } => {
                    let c = ctx.borrow();
                    if let Some((dir, _)) = &checkpoint_dir_seq {
                        let snapshot = build_worker_snapshot(&c.worker, app.as_ref(), &c.tracker, id, &config, sequence);
                        if let Err(e) = checkpoint::write_checkpoint(dir, &snapshot) {
                            log::error!("worker {id} failed to write checkpoint: {e}");
                        }
                    }
                    drop(c);
                    stop = true;
                }
                Message::SpBufferWarning { grow_to_at_least } => {
                    ctx.borrow_mut().worker.note_buffer_warning(grow_to_at_least);
                }
                Message::SpDeliver(deliveries) => {
                    let mut c = ctx.borrow_mut();
                    for delivered in deliveries {
                        if let Ok(payload) = registry.decode_payload(&delivered.packed) {
                            c.worker.insert_root(payload, delivered.bound);
                            c.worker.record_ack(delivered.address, delivered.bound);
                        }
                    }
                }
                Message::Incumbent(inc) => {
                    if let Ok(solution) = bincode::deserialize::<A::Solution>(&inc.payload) {
                        let mut c = ctx.borrow_mut();
                        if c.tracker.offer(inc.value, inc.source, solution) && config.track_incumbent {
                            crate::stats::log_incumbent_improvement(inc.value, inc.source);
                        }
                    }
                }
                Message::HubBroadcast { rebalance_count, target, cluster_load, .. } => {
                    let mut c = ctx.borrow_mut();
                    c.worker.observe_hubs_rebalance_count(rebalance_count);
                    c.worker.set_target(target);
                    c.cluster_count = cluster_load.count;
                }
                _ => {}
            }
            if stop {
                break;
            }
        }
        if stop {
            return ctx.borrow().best_solution.clone();
        }

        let did_work = scheduler.run_once();
        if ctx.borrow().error.is_some() {
            return ctx.borrow().best_solution.clone();
        }

        {
            let mut c = ctx.borrow_mut();
            let target = c.worker.target();
            let mut rebalance_flag = false;
            if c.worker.should_rebalance(&config, target) {
                let app_clone = Arc::clone(&c.app);
                let tokens = c.worker.rebalance(&config, app_clone.as_ref());
                c.to_release.extend(tokens);
                rebalance_flag = true;
            }

            let acks = c.worker.drain_acks();
            let incumbent_value = c.tracker.value();
            let should_send = !c.to_release.is_empty() || !acks.is_empty() || rebalance_flag || !did_work;
            if should_send {
                let load_block = LoadBlock {
                    count: c.worker.local_count(),
                    aggregate_bound: 0.0,
                    incumbent_value: incumbent_value.unwrap_or(f64::INFINITY),
                    memory: None,
                    mismatch_flag: false,
                };
                let tokens = std::mem::take(&mut c.to_release);
                let _ = outbox.send((
                    id,
                    Message::HubUpdate {
                        tokens,
                        load_block: Some(load_block),
                        acks,
                        message_adjust: 0,
                        rebalance_flag,
                    },
                ));
            }
        }

        if !did_work {
            thread::sleep(IDLE_POLL);
        }
    }
}

/// Sends each dispatched `(worker, token)` pair over the wire, prefixing a
/// `SpBufferWarning` when the worker's known receive buffer is too small
/// (spec §5 back-pressure). Shared by the steady-state `dispatch()` call and
/// the force-dispatches `receive_releases`/`receive_foreign_tokens` make to
/// keep the pool within `maxTokenQueuing`.
fn send_dispatch_batch(
    hub: &mut Hub,
    outboxes: &HashMap<ProcessId, crossbeam_channel::Sender<Message>>,
    dispatched: Vec<(ProcessId, Token)>,
) {
    for (dest, token) in dispatched {
        if let Some(tx) = outboxes.get(&dest) {
            if let Some(grow_to_at_least) = hub.buffer_warning_for(dest, token.payload.len()) {
                let _ = tx.send(Message::SpBufferWarning { grow_to_at_least });
            }
            let _ = tx.send(Message::SpDeliver(vec![crate::message::DeliveredSubproblem {
                address: token.address,
                bound: token.bound,
                packed: token.payload,
            }]));
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_hub_thread<A: Application>(
    hub_id: ProcessId,
    worker_ids: &[ProcessId],
    app: Arc<A>,
    config: Config,
    inbox: crossbeam_channel::Receiver<(ProcessId, Message)>,
    outboxes: HashMap<ProcessId, crossbeam_channel::Sender<Message>>,
    created_total: Arc<AtomicU64>,
    explored_total: Arc<AtomicUsize>,
    checkpoint: Option<CheckpointSpec>,
    coordinator: Option<CoordinatorLink>,
    seed_incumbent: Option<(f64, ProcessId, Vec<u8>)>,
) -> Option<(f64, ProcessId, Vec<u8>)> {
    let mut hub = Hub::with_receive_buf(hub_id, app.sense(), worker_ids, config.sp_receive_buf);
    let mut tracker: IncumbentTracker<Vec<u8>> = IncumbentTracker::new(app.sense());
    if let Some((value, source, payload)) = seed_incumbent {
        tracker.offer(value, source, payload);
    }
    let mut last_counts: HashMap<ProcessId, usize> = worker_ids.iter().map(|&id| (id, 0)).collect();
    let mut idle_rounds = 0u32;
    let mut status_round = 0u64;
    const STATUS_PRINT_EVERY: u64 = 500;

    loop {
        if let Some(spec) = &checkpoint {
            if explored_total.load(Ordering::Relaxed) >= spec.stop_after_explored {
                for tx in outboxes.values() {
                    let _ = tx.send(Message::CheckpointBarrier { sequence: spec.sequence });
                }
                let snapshot = build_hub_snapshot(&hub, &tracker, hub_id, &config, spec.sequence);
                if let Err(e) = checkpoint::write_checkpoint(&spec.dir, &snapshot) {
                    log::error!("hub {hub_id} failed to write checkpoint: {e}");
                }
                break;
            }
        }

        if config.ramp_up_only && created_total.load(Ordering::Relaxed) >= config.min_ramp_up_subprobs_created as u64 {
            for tx in outboxes.values() {
                let _ = tx.send(Message::Abort {
                    reason: "ramp-up threshold reached".to_string(),
                });
            }
            break;
        }

        let mut saw_message = false;
        while let Ok((from, msg)) = inbox.try_recv() {
            saw_message = true;
            match msg {
                Message::HubUpdate {
                    tokens,
                    load_block,
                    acks,
                    rebalance_flag,
                    ..
                } => {
                    let overflow = hub.receive_releases(from, tokens, &config);
                    send_dispatch_batch(&mut hub, &outboxes, overflow);
                    let ack_pairs: Vec<(Address, f64)> = acks.iter().map(|a| (a.address, a.bound)).collect();
                    hub.receive_acks(from, &ack_pairs, tracker.value());
                    if let Some(block) = load_block {
                        last_counts.insert(from, block.count);
                        hub.set_worker_count(from, block.count);
                    }
                    if rebalance_flag {
                        hub.bump_rebalance_tally();
                    }
                }
                Message::Incumbent(inc) => {
                    if tracker.offer(inc.value, inc.source, inc.payload.clone()) {
                        if config.track_incumbent {
                            crate::stats::log_incumbent_improvement(inc.value, inc.source);
                        }
                        hub.prune_on_incumbent(inc.value);
                        for tx in outboxes.values() {
                            let _ = tx.send(Message::Incumbent(inc.clone()));
                        }
                        if let Some(link) = &coordinator {
                            let _ = link.to_coordinator.send((hub_id, CoordinatorInbound::Incumbent(inc.clone())));
                        }
                    }
                }
                _ => {}
            }
        }

        let target = 1.0_f64.max(hub.token_count() as f64 / worker_ids.len().max(1) as f64);
        let dispatched = hub.dispatch(&config, target);
        if !dispatched.is_empty() {
            saw_message = true;
        }
        send_dispatch_batch(&mut hub, &outboxes, dispatched);

        if let Some(link) = &coordinator {
            let cluster_load = LoadBlock {
                count: hub.token_count() + last_counts.values().sum::<usize>(),
                aggregate_bound: 0.0,
                incumbent_value: tracker.value().unwrap_or(f64::INFINITY),
                memory: None,
                mismatch_flag: false,
            };
            let _ = link.to_coordinator.send((hub_id, CoordinatorInbound::Load(cluster_load)));

            while let Ok(msg) = link.from_coordinator.try_recv() {
                saw_message = true;
                match msg {
                    CoordinatorOutbound::Incumbent(inc) => {
                        if tracker.offer(inc.value, inc.source, inc.payload.clone()) {
                            hub.prune_on_incumbent(inc.value);
                            for tx in outboxes.values() {
                                let _ = tx.send(Message::Incumbent(inc.clone()));
                            }
                        }
                    }
                    CoordinatorOutbound::TransferRequest { to, count } => {
                        let tokens = hub.take_best_tokens(count);
                        if !tokens.is_empty() {
                            let _ = link.to_coordinator.send((hub_id, CoordinatorInbound::TransferOut { to, tokens }));
                        }
                    }
                    CoordinatorOutbound::TransferIn(tokens) => {
                        let overflow = hub.receive_foreign_tokens(tokens, &config);
                        send_dispatch_batch(&mut hub, &outboxes, overflow);
                    }
                    CoordinatorOutbound::Abort => {
                        for tx in outboxes.values() {
                            let _ = tx.send(Message::Abort {
                                reason: "global termination".to_string(),
                            });
                        }
                        return tracker.get().map(|inc| (inc.value, inc.source, inc.solution.clone()));
                    }
                }
            }
        } else {
            let total_live: usize = hub.token_count() + last_counts.values().sum::<usize>();
            if total_live == 0 && !saw_message {
                idle_rounds += 1;
            } else {
                idle_rounds = 0;
            }

            if idle_rounds >= IDLE_ROUNDS_TO_TERMINATE {
                for tx in outboxes.values() {
                    let _ = tx.send(Message::Abort {
                        reason: "global termination".to_string(),
                    });
                }
                break;
            }
        }

        // workersPrintStatus / hubsPrintStatus (spec §7): one status line
        // per `STATUS_PRINT_EVERY` rounds rather than a wall-clock timer,
        // since this implementation's rounds are already throttled by
        // IDLE_POLL backoff.
        status_round += 1;
        if status_round % STATUS_PRINT_EVERY == 0 {
            if config.hubs_print_status {
                crate::stats::log_hub_status(hub_id, hub.token_count(), hub.load_snapshot().aggregate_bound);
            }
            if config.workers_print_status {
                crate::stats::print_worker_table(&hub.worker_rows());
            }
        }

        // broadcastLoadIfNeeded (spec §4.4): every round, since this
        // implementation's rounds are already throttled by IDLE_POLL
        // backoff rather than a fixed timer.
        let total_live: usize = hub.token_count() + last_counts.values().sum::<usize>();
        let cluster_load = LoadBlock {
            count: total_live,
            aggregate_bound: 0.0,
            incumbent_value: tracker.value().unwrap_or(f64::INFINITY),
            memory: None,
            mismatch_flag: false,
        };
        for tx in outboxes.values() {
            let _ = tx.send(Message::HubBroadcast {
                cluster_load,
                global_load: None,
                rebalance_count: hub.rebalance_tally(),
                load_bal_round: 0,
                target,
            });
        }

        if !saw_message {
            thread::sleep(IDLE_POLL);
        }
    }

    tracker.get().map(|inc| (inc.value, inc.source, inc.solution.clone()))
}

/// Channel pair connecting one cluster's hub thread to the multi-cluster
/// coordinator (spec §4.5).
struct CoordinatorLink {
    to_coordinator: crossbeam_channel::Sender<(ProcessId, CoordinatorInbound)>,
    from_coordinator: crossbeam_channel::Receiver<CoordinatorOutbound>,
}

enum CoordinatorInbound {
    Load(LoadBlock),
    Incumbent(IncumbentMessage),
    TransferOut { to: ProcessId, tokens: Vec<Token> },
}

enum CoordinatorOutbound {
    Incumbent(IncumbentMessage),
    TransferRequest { to: ProcessId, count: usize },
    TransferIn(Vec<Token>),
    Abort,
}

/// The `GlobalLoadBalancer` thread (spec §4.5): reduces every cluster's
/// load into one `GlobalLoad` via [`crate::load_balancer::reduce`], plans
/// donor -> receiver transfers via [`crate::load_balancer::plan_redistribution`],
/// relays incumbent improvements between clusters, and detects global
/// termination via [`crate::load_balancer::termination_reached`].
fn run_coordinator(
    hub_ids: Vec<ProcessId>,
    config: Config,
    sense: Sense,
    inbound_rx: crossbeam_channel::Receiver<(ProcessId, CoordinatorInbound)>,
    outbound_txs: HashMap<ProcessId, crossbeam_channel::Sender<CoordinatorOutbound>>,
) {
    let mut loads: HashMap<ProcessId, LoadBlock> = hub_ids
        .iter()
        .map(|&id| {
            (
                id,
                LoadBlock {
                    count: 0,
                    aggregate_bound: 0.0,
                    incumbent_value: f64::INFINITY,
                    memory: None,
                    mismatch_flag: false,
                },
            )
        })
        .collect();
    let mut idle_rounds = 0u32;

    loop {
        let mut saw = false;
        while let Ok((from, msg)) = inbound_rx.try_recv() {
            saw = true;
            match msg {
                CoordinatorInbound::Load(load) => {
                    loads.insert(from, load);
                }
                CoordinatorInbound::Incumbent(inc) => {
                    for (&hub, tx) in &outbound_txs {
                        if hub != from {
                            let _ = tx.send(CoordinatorOutbound::Incumbent(inc.clone()));
                        }
                    }
                }
                CoordinatorInbound::TransferOut { to, tokens } => {
                    if !tokens.is_empty() {
                        if let Some(tx) = outbound_txs.get(&to) {
                            let _ = tx.send(CoordinatorOutbound::TransferIn(tokens));
                        }
                    }
                }
            }
        }

        let blocks: Vec<LoadBlock> = loads.values().copied().collect();
        let global = crate::load_balancer::reduce(&blocks);
        let avg = global.count as f64 / hub_ids.len().max(1) as f64;
        let load_pairs: Vec<(ProcessId, usize)> = loads.iter().map(|(&id, l)| (id, l.count)).collect();
        let transfers = crate::load_balancer::plan_redistribution(
            &load_pairs,
            avg,
            config.load_bal_donor_fac,
            config.load_bal_receiver_fac,
            config.load_bal_min_source_count,
            config.max_load_bal_size,
        );
        for t in transfers {
            if let Some(tx) = outbound_txs.get(&t.from) {
                let _ = tx.send(CoordinatorOutbound::TransferRequest { to: t.to, count: t.count });
            }
        }

        if crate::load_balancer::termination_reached(&global, !saw) {
            idle_rounds += 1;
        } else {
            idle_rounds = 0;
        }

        if idle_rounds >= IDLE_ROUNDS_TO_TERMINATE {
            for tx in outbound_txs.values() {
                let _ = tx.send(CoordinatorOutbound::Abort);
            }
            break;
        }

        if !saw {
            let interval = crate::load_balancer::next_round_interval(config.load_bal_seconds, config.load_bal_idle_increase, idle_rounds > 0);
            thread::sleep(Duration::from_secs_f64(interval.max(0.0)));
        }
    }
}

fn timestamp_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Builds the `ProcessSnapshot` a worker writes on a `CheckpointBarrier`
/// (spec §4.7): every resident subproblem's bound and packed payload,
/// plus the locally-tracked incumbent.
fn build_worker_snapshot<A: Application>(
    worker: &Worker<A>,
    app: &A,
    tracker: &IncumbentTracker<A::Solution>,
    id: ProcessId,
    config: &Config,
    sequence: u64,
) -> ProcessSnapshot {
    let arena = worker.arena();
    let ids = worker.pool_ids();
    let local_pool_bounds: Vec<(u32, u32, f64)> = ids
        .iter()
        .filter_map(|&sp_id| arena.get(sp_id).map(|sp| (sp_id.slot, sp_id.generation, sp.bound)))
        .collect();
    let packed_payloads: Vec<(u32, u32, Vec<u8>)> = ids
        .iter()
        .filter_map(|&sp_id| arena.get(sp_id).map(|sp| (sp_id.slot, sp_id.generation, app.pack(&sp.payload))))
        .collect();
    let incumbent = tracker
        .get()
        .map(|inc| (inc.value, inc.source, bincode::serialize(&inc.solution).unwrap_or_default()));

    ProcessSnapshot {
        header: CheckpointHeader {
            sequence,
            process_id: id,
            topology_descriptor: format!("worker/cluster_size={}", config.cluster_size),
            timestamp_secs: timestamp_secs(),
        },
        local_pool_bounds,
        token_pool: Vec::new(),
        packed_payloads,
        incumbent,
        rebalance_count: 0,
        in_flight_acks: Vec::new(),
    }
}

/// Builds the hub's own `ProcessSnapshot`: its `TokenPool` contents (each
/// already carrying its packed payload) plus the hub-side incumbent.
fn build_hub_snapshot(hub: &Hub, tracker: &IncumbentTracker<Vec<u8>>, hub_id: ProcessId, config: &Config, sequence: u64) -> ProcessSnapshot {
    ProcessSnapshot {
        header: CheckpointHeader {
            sequence,
            process_id: hub_id,
            topology_descriptor: format!("hub/cluster_size={}", config.cluster_size),
            timestamp_secs: timestamp_secs(),
        },
        local_pool_bounds: Vec::new(),
        token_pool: hub.token_snapshot(),
        packed_payloads: Vec::new(),
        incumbent: tracker.get().map(|inc| (inc.value, inc.source, inc.solution.clone())),
        rebalance_count: hub.rebalance_tally(),
        in_flight_acks: Vec::new(),
    }
}

/// Reads every `ckpt.<sequence>.*` file under `dir` (excluding the
/// `.complete` marker).
fn load_all_snapshots(dir: &std::path::Path, sequence: u64) -> Result<Vec<ProcessSnapshot>, EngineError> {
    let prefix = format!("ckpt.{sequence}.");
    let mut snapshots = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && !name.ends_with(".complete") {
            snapshots.push(checkpoint::read_checkpoint(&entry.path())?);
        }
    }
    Ok(snapshots)
}

/// Merges every snapshot's resident subproblems and in-flight tokens into
/// one restart seed list (spec §4.7 "Restart").
fn combine_seed_items(snapshots: &[ProcessSnapshot]) -> Vec<(f64, Vec<u8>)> {
    let mut items = Vec::new();
    for snap in snapshots {
        let bound_by_key: HashMap<(u32, u32), f64> = snap
            .local_pool_bounds
            .iter()
            .map(|&(slot, generation, bound)| ((slot, generation), bound))
            .collect();
        for &(slot, generation, ref packed) in &snap.packed_payloads {
            let bound = bound_by_key.get(&(slot, generation)).copied().unwrap_or(f64::NEG_INFINITY);
            items.push((bound, packed.clone()));
        }
        for token in &snap.token_pool {
            items.push((token.bound, token.payload.clone()));
        }
    }
    items
}

/// Folds every snapshot's recorded incumbent into the single best one,
/// using the same strict-improvement-or-lower-source tie-break as
/// [`IncumbentTracker::would_replace`].
fn combine_incumbent(snapshots: &[ProcessSnapshot], sense: Sense) -> Option<(f64, ProcessId, Vec<u8>)> {
    let mut best: Option<(f64, ProcessId, Vec<u8>)> = None;
    for snap in snapshots {
        if let Some((value, source, payload)) = &snap.incumbent {
            let replace = match &best {
                None => true,
                Some((v, s, _)) => sense.strictly_improves(*value, *v) || (*value == *v && source < s),
            };
            if replace {
                best = Some((*value, *source, payload.clone()));
            }
        }
    }
    best
}
