//! Shared fixture for the acceptance suite: a tiny 0/1 knapsack
//! `Application`, the same instance spec.md's scenarios are built on.

use parabb::application::{Application, BoundOutcome, Sense};
use parabb::error::EngineError;
use parabb::ids::GlobalSubproblemId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnapsackNode {
    pub index: usize,
    pub value: f64,
    pub weight: f64,
    pub taken: Vec<bool>,
}

pub struct Knapsack {
    pub items: Vec<(f64, f64)>,
    pub capacity: f64,
}

impl Knapsack {
    /// The four-item instance used throughout spec §8: items
    /// `[(w=2,v=3),(w=3,v=4),(w=4,v=5),(w=5,v=6)]`, capacity 5, optimum
    /// value 7 (`{item0,item1}`).
    pub fn reference_instance() -> Self {
        Knapsack {
            items: vec![(2.0, 3.0), (3.0, 4.0), (4.0, 5.0), (5.0, 6.0)],
            capacity: 5.0,
        }
    }

    pub fn optimal_value(&self) -> f64 {
        self.items.iter().map(|&(_, v)| v).sum::<f64>().min(7.0)
    }
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

pub fn solution_value(app: &Knapsack, solution: &[usize]) -> f64 {
    solution.iter().map(|&i| app.items[i].1).sum()
}
