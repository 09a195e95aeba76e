//! A tiny reference `Application`: 0/1 knapsack, branch-and-bound with a
//! fractional-relaxation bound (spec §8 scenario 1). Exists to exercise
//! `Engine` end to end, not as a serious solver.

use clap::Parser;
use log::info;
use parabb::application::{Application, BoundOutcome, Sense};
use parabb::config::Config;
use parabb::error::EngineError;
use parabb::ids::GlobalSubproblemId;
use parabb::runtime::Engine;
use parabb::utils::human_duration;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

#[derive(Parser)]
struct Args {
    /// Number of worker processes. 1 runs the degenerate single-process
    /// path with no hub.
    #[arg(short = 'w', long = "workers", default_value_t = 1)]
    workers: usize,
    /// Knapsack capacity.
    #[arg(short = 'c', long = "capacity", default_value_t = 5.0)]
    capacity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnapsackNode {
    /// Index of the next item to decide.
    index: usize,
    value: f64,
    weight: f64,
    taken: Vec<bool>,
}

struct Knapsack {
    items: Vec<(f64, f64)>, // (weight, value)
    capacity: f64,
}

impl Application for Knapsack {
    type Payload = KnapsackNode;
    type Solution = Vec<usize>;

    fn sense(&self) -> Sense {
        Sense::Max
    }

    fn root_subproblem(&self) -> KnapsackNode {
        KnapsackNode {
            index: 0,
            value: 0.0,
            weight: 0.0,
            taken: Vec::new(),
        }
    }

    /// Fractional-relaxation upper bound on the best achievable value from
    /// this node onward (classic knapsack B&B bound).
    fn bound(&self, payload: &mut KnapsackNode, _work_quantum: &mut f64) -> BoundOutcome {
        if payload.weight > self.capacity {
            return BoundOutcome::Dead;
        }
        let mut remaining = self.capacity - payload.weight;
        let mut estimate = payload.value;
        for &(weight, value) in &self.items[payload.index..] {
            if remaining <= 0.0 {
                break;
            }
            if weight <= remaining {
                remaining -= weight;
                estimate += value;
            } else {
                estimate += value * (remaining / weight);
                remaining = 0.0;
            }
        }
        BoundOutcome::Bounded(estimate)
    }

    fn separate(&self, payload: &KnapsackNode, _id: GlobalSubproblemId) -> Result<usize, EngineError> {
        debug_assert!(payload.index < self.items.len());
        Ok(2)
    }

    fn make_child(&self, payload: &KnapsackNode, which_child: usize) -> KnapsackNode {
        let (weight, value) = self.items[payload.index];
        let mut next = payload.clone();
        next.index += 1;
        if which_child == 1 {
            next.weight += weight;
            next.value += value;
            next.taken.push(true);
        } else {
            next.taken.push(false);
        }
        next
    }

    fn candidate_solution(&self, payload: &KnapsackNode) -> bool {
        payload.index == self.items.len()
    }

    fn extract_solution(&self, payload: &KnapsackNode) -> Vec<usize> {
        payload
            .taken
            .iter()
            .enumerate()
            .filter_map(|(i, &taken)| taken.then_some(i))
            .collect()
    }

    fn compare_solution(&self, a: &Vec<usize>, b: &Vec<usize>) -> Ordering {
        let value_of = |s: &Vec<usize>| s.iter().map(|&i| self.items[i].1).sum::<f64>();
        value_of(a).partial_cmp(&value_of(b)).unwrap_or(Ordering::Equal)
    }

    fn pack(&self, payload: &KnapsackNode) -> Vec<u8> {
        bincode::serialize(payload).unwrap_or_default()
    }

    fn unpack(&self, bytes: &[u8]) -> Result<KnapsackNode, EngineError> {
        bincode::deserialize(bytes).map_err(EngineError::from)
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let app = Knapsack {
        items: vec![(2.0, 3.0), (3.0, 4.0), (4.0, 5.0), (5.0, 6.0)],
        capacity: args.capacity,
    };

    let mut config = Config::default();
    config.cluster_size = args.workers;

    let start = Instant::now();
    let engine = Engine::new(app, config);
    let outcome = engine.run();

    match outcome.incumbent {
        Some((value, source, solution)) => {
            info!(
                "best value {value} found by {source}, items {solution:?} ({} subproblems explored, {})",
                outcome.subproblems_explored,
                human_duration(start.elapsed())
            );
        }
        None => info!("no feasible solution found"),
    }
}
