use std::hint::black_box;

use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use hive::{
    context::Batch,
    dispatch,
    prelude::*,
    snapshot::{self, ActorSnapshot},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Counter {
    count: u64,
    seen: Vec<String>,
}

#[impl_id("b7c41e52-93a0-4f6e-8d2b-0e5a9c3f6d11")]
impl Coroutine for Counter {
    fn resume(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<Step> {
        if let Some(msg) = ctx.message_as::<String>() {
            self.seen.push(msg.clone());
            self.count += 1;

            let to = ctx.source().clone();
            ctx.out(to, self.count)?;
        }
        Ok(Step::Suspend)
    }
}

fn addr(s: &str) -> Address {
    s.parse().unwrap()
}

fn bench_fire(c: &mut Criterion) {
    let mut root = Actor::root(addr("runner:counter"), Counter::default());
    let source = addr("sender:bench");
    let destination = addr("runner:counter");
    let msg = "ping".to_string();

    c.bench_function("dispatch::fire", |b| {
        b.iter(|| {
            let mut batch = Batch::default();
            let outcome = dispatch::fire(
                &mut root,
                &mut batch,
                &source,
                &destination,
                Utc::now(),
                &msg,
            );
            black_box((outcome, batch));
        })
    });
}

fn bench_snapshot_round_trip(c: &mut Criterion) {
    let mut root = Actor::root(addr("runner:counter"), Counter::default());
    let source = addr("sender:bench");
    let destination = addr("runner:counter");

    for n in 0..256 {
        let mut batch = Batch::default();
        let msg = format!("warmup {n}");
        dispatch::fire(&mut root, &mut batch, &source, &destination, Utc::now(), &msg);
    }

    c.bench_function("snapshot::capture+restore", |b| {
        b.iter(|| {
            let snapshot = ActorSnapshot::capture(&root, 1).unwrap();
            black_box(snapshot.restore().unwrap());
        })
    });

    let bytes = snapshot::serialize(&root).unwrap();
    c.bench_function("snapshot::deserialize", |b| {
        b.iter(|| black_box(snapshot::deserialize(&bytes).unwrap()))
    });
}

criterion_group!(benches, bench_fire, bench_snapshot_round_trip);
criterion_main!(benches);
