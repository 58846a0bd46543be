//! Round-trip latency of the two bridges
//!
//! - spin-over: plain thread -> owner loop -> back
//! - spin-off: plain thread -> pooled worker -> back
//! - spin-off from the owner thread, pumping while it waits

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use spin::{stand_in, OwnerThread, Spin, SpinConfig, StandIn, StarterKind};

pub trait Counter: Send + Sync {
    fn bump(&self, by: u64) -> u64;
}

stand_in! {
    pub struct CounterStandIn for dyn Counter {
        fn bump(&self, by: u64) -> u64;
    }
}

struct Relaxed(std::sync::atomic::AtomicU64);

impl Counter for Relaxed {
    fn bump(&self, by: u64) -> u64 {
        self.0.fetch_add(by, std::sync::atomic::Ordering::Relaxed) + by
    }
}

fn counter() -> Arc<dyn Counter> {
    Arc::new(Relaxed(std::sync::atomic::AtomicU64::new(0)))
}

fn setup() -> (OwnerThread, Spin) {
    let config = SpinConfig::new()
        .owner_thread_name("bench-owner")
        .starter(StarterKind::Pooled)
        .pool_keep_alive(Duration::from_secs(10))
        .idle_park(Duration::from_millis(1));
    let owner = OwnerThread::spawn(&config).expect("owner thread");
    let spin = Spin::with_config(owner.owner(), &config).expect("bridge");
    (owner, spin)
}

fn bench_direct(c: &mut Criterion) {
    let target = counter();
    c.bench_function("direct_call", |b| b.iter(|| black_box(target.bump(black_box(1)))));
}

fn bench_spin_over(c: &mut Criterion) {
    let (owner, spin) = setup();
    let stand_in = spin.over::<CounterStandIn>(counter()).unwrap().into_target();

    c.bench_function("spin_over_sync", |b| {
        b.iter(|| black_box(stand_in.bump(black_box(1))))
    });
    owner.shutdown().unwrap();
}

fn bench_spin_off(c: &mut Criterion) {
    let (owner, spin) = setup();
    let stand_in = spin.off::<CounterStandIn>(counter()).unwrap().into_target();

    c.bench_function("spin_off_blocking", |b| {
        b.iter(|| black_box(stand_in.bump(black_box(1))))
    });
    owner.shutdown().unwrap();
}

fn bench_spin_off_pumping(c: &mut Criterion) {
    let (owner, spin) = setup();
    let stand_in = spin.off::<CounterStandIn>(counter()).unwrap().into_target();
    let event_loop = owner.event_loop().clone();

    c.bench_function("spin_off_pumping_x100", |b| {
        b.iter(|| {
            let stand_in = Arc::clone(&stand_in);
            event_loop
                .invoke_and_wait(move || {
                    let mut last = 0;
                    for _ in 0..100 {
                        last = stand_in.bump(1);
                    }
                    last
                })
                .unwrap()
        })
    });
    owner.shutdown().unwrap();
}

criterion_group!(
    benches,
    bench_direct,
    bench_spin_over,
    bench_spin_off,
    bench_spin_off_pumping
);
criterion_main!(benches);
