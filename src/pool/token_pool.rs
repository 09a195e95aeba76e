//! Ordered collection of tokens held by one hub (spec §4.2, §4.4).

use crate::application::Sense;
use crate::ids::Address;
use crate::pool::LoadSnapshot;
use crate::pool::heap::IndexedHeap;
use crate::token::Token;
use std::collections::HashMap;

/// Hub-local ordered set of tokens, ordered by `bound` then arrival order
/// (spec §3). A token's `address` uniquely identifies it within one pool.
pub struct TokenPool {
    sense: Sense,
    heap: IndexedHeap<Address>,
    tokens: HashMap<Address, Token>,
    aggregate_bound: f64,
}

impl TokenPool {
    pub fn new(sense: Sense) -> Self {
        TokenPool {
            sense,
            heap: IndexedHeap::new(),
            tokens: HashMap::new(),
            aggregate_bound: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.tokens.contains_key(&address)
    }

    pub fn get(&self, address: Address) -> Option<&Token> {
        self.tokens.get(&address)
    }

    fn cmp_key(sense: Sense, tokens: &HashMap<Address, Token>, a: Address, b: Address) -> std::cmp::Ordering {
        let ta = &tokens[&a];
        let tb = &tokens[&b];
        sense
            .order_bound(ta.bound, tb.bound)
            .then_with(|| tb.sequence.cmp(&ta.sequence))
    }

    /// Inserts a token. O(log n).
    pub fn insert(&mut self, token: Token) {
        let address = token.address;
        self.aggregate_bound += token.bound;
        self.tokens.insert(address, token);
        let tokens = &self.tokens;
        let sense = self.sense;
        self.heap
            .insert(address, |a, b| Self::cmp_key(sense, tokens, a, b));
    }

    /// Removes and returns the best token (earliest arrival among ties).
    pub fn remove_best(&mut self) -> Option<Token> {
        let tokens = &self.tokens;
        let sense = self.sense;
        let best = self
            .heap
            .pop(|a, b| Self::cmp_key(sense, tokens, a, b))?;
        let token = self.tokens.remove(&best)?;
        self.aggregate_bound -= token.bound;
        Some(token)
    }

    /// Removes a specific token by address (e.g. it was acknowledged and
    /// turned out to already be fathomable).
    pub fn remove(&mut self, address: Address) -> Option<Token> {
        let tokens = &self.tokens;
        let sense = self.sense;
        if self
            .heap
            .remove(address, |a, b| Self::cmp_key(sense, tokens, a, b))
        {
            let token = self.tokens.remove(&address)?;
            self.aggregate_bound -= token.bound;
            Some(token)
        } else {
            None
        }
    }

    /// Drops every token whose bound is dominated by `cutoff`. Iteration
    /// order is the pool's own. Idempotent: a second call finds nothing.
    pub fn prune(&mut self, cutoff: f64) -> Vec<Token> {
        let sense = self.sense;
        let dominated: Vec<Address> = self
            .heap
            .iter()
            .filter(|&addr| sense.is_dominated(self.tokens[&addr].bound, cutoff))
            .collect();
        dominated
            .into_iter()
            .filter_map(|addr| self.remove(addr))
            .collect()
    }

    pub fn load_snapshot(&self) -> LoadSnapshot {
        if self.is_empty() {
            return LoadSnapshot::EMPTY;
        }
        let min_bound = self
            .heap
            .peek()
            .map(|addr| self.tokens[&addr].bound)
            .unwrap_or(f64::INFINITY);
        LoadSnapshot {
            count: self.len(),
            aggregate_bound: self.aggregate_bound,
            min_bound,
        }
    }

    /// Every token currently held, cloned in no particular order. Used by
    /// checkpointing (spec §4.7) to serialize the hub's pool without
    /// draining it.
    pub fn snapshot(&self) -> Vec<Token> {
        self.tokens.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ProcessId, SubproblemId};
    use crate::token::TokenKind;

    fn token(slot: u32, bound: f64, sequence: u64) -> Token {
        Token {
            address: Address {
                home: ProcessId(0),
                local: SubproblemId {
                    slot,
                    generation: 0,
                },
            },
            bound,
            kind: TokenKind::SelfToken,
            multiplicity: 1,
            sequence,
            payload: Vec::new(),
        }
    }

    #[test]
    fn best_first_by_bound_then_arrival() {
        let mut pool = TokenPool::new(Sense::Min);
        pool.insert(token(0, 5.0, 0));
        pool.insert(token(1, 5.0, 1));
        pool.insert(token(2, 2.0, 2));
        assert_eq!(pool.remove_best().unwrap().address.local.slot, 2);
        assert_eq!(pool.remove_best().unwrap().address.local.slot, 0);
        assert_eq!(pool.remove_best().unwrap().address.local.slot, 1);
    }

    #[test]
    fn prune_is_idempotent() {
        let mut pool = TokenPool::new(Sense::Min);
        pool.insert(token(0, 10.0, 0));
        pool.insert(token(1, 1.0, 1));
        assert_eq!(pool.prune(6.0).len(), 1);
        assert!(pool.prune(6.0).is_empty());
        assert_eq!(pool.len(), 1);
    }
}
