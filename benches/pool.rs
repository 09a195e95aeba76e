use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use parabb::application::Sense;
use parabb::ids::{Address, ProcessId, SubproblemId};
use parabb::pool::LocalPool;
use parabb::token::{Token, TokenKind};

fn id(slot: u32) -> SubproblemId {
    SubproblemId { slot, generation: 0 }
}

fn bench_local_pool_insert(c: &mut Criterion) {
    c.bench_function("local_pool_insert_1000", |b| {
        b.iter(|| {
            let mut pool = LocalPool::new(Sense::Min);
            for i in 0..1000u32 {
                pool.insert(black_box(id(i)), black_box((i % 97) as f64));
            }
            pool
        })
    });
}

fn bench_local_pool_select_best(c: &mut Criterion) {
    c.bench_function("local_pool_select_best_1000", |b| {
        b.iter(|| {
            let mut pool = LocalPool::new(Sense::Min);
            for i in 0..1000u32 {
                pool.insert(id(i), (i % 97) as f64);
            }
            while let Some(picked) = pool.select_best() {
                black_box(picked);
            }
        })
    });
}

fn bench_local_pool_prune(c: &mut Criterion) {
    c.bench_function("local_pool_prune_half", |b| {
        b.iter(|| {
            let mut pool = LocalPool::new(Sense::Min);
            for i in 0..1000u32 {
                pool.insert(id(i), i as f64);
            }
            black_box(pool.prune(500.0));
        })
    });
}

fn token(slot: u32, bound: f64) -> Token {
    Token {
        address: Address {
            home: ProcessId(0),
            local: id(slot),
        },
        bound,
        kind: TokenKind::SelfToken,
        multiplicity: 1,
        sequence: slot as u64,
        payload: Vec::new(),
    }
}

fn bench_token_pool_insert_and_drain(c: &mut Criterion) {
    c.bench_function("token_pool_insert_and_drain_1000", |b| {
        b.iter(|| {
            let mut pool = parabb::pool::TokenPool::new(Sense::Min);
            for i in 0..1000u32 {
                pool.insert(token(i, (i % 97) as f64));
            }
            while let Some(t) = pool.remove_best() {
                black_box(t);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_local_pool_insert,
    bench_local_pool_select_best,
    bench_local_pool_prune,
    bench_token_pool_insert_and_drain,
);
criterion_main!(benches);
