#![allow(unused)]
extern crate passplan;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use passplan::prelude::*;
use std::hint::black_box;

/// Tag names must be static, the synthetic catalogs leak theirs once per benchmark run
fn tag(index: usize) -> Tag {
    let name: &'static str = Box::leak(format!("t{index}").into_boxed_str());
    Tag::new(name, NodeKind::Method)
}

/// `length` units in a chain, each needing the previous tag, plus a side consumer every 4 units
/// that only maximal plans select.
fn catalog(length: usize) -> (Registry, Tag) {
    let tags: Vec<Tag> = (0..=length).map(tag).collect();
    let mut registry = Registry::new();

    for index in 0..length {
        let mut builder = Descriptor::builder(format!("unit-{index:04}"))
            .granularity(NodeKind::Method)
            .adds(tags[index + 1]);
        if index > 0 {
            builder = builder.needs(tags[index]);
        }
        registry
            .register(PassiveUnit::passive(builder.build().unwrap()))
            .unwrap();

        if index % 4 == 3 {
            let side = Descriptor::builder(format!("side-{index:04}"))
                .granularity(NodeKind::Method)
                .needs(tags[index + 1])
                .order_hint(1)
                .build()
                .unwrap();
            registry.register(PassiveUnit::passive(side)).unwrap();
        }
    }

    (registry, tags[length])
}

fn program(types: usize, methods: usize) -> IrTree {
    let tree = IrTree::new("bench");
    let package = tree
        .add_child(tree.root(), NodeKind::Package, "bench")
        .unwrap();
    for t in 0..types {
        let ty = tree
            .add_child(package, NodeKind::Type, format!("T{t}"))
            .unwrap();
        for m in 0..methods {
            let method = tree
                .add_child(ty, NodeKind::Method, format!("m{m}"))
                .unwrap();
            for s in 0..4 {
                tree.add_child(method, NodeKind::Statement, format!("s{s}"))
                    .unwrap();
            }
        }
    }
    tree
}

/// Planning cost for growing catalogs
fn bench_plan(c: &mut Criterion) {
    let features = Features::new();
    let mut group = c.benchmark_group("plan");

    for length in [16, 64, 256] {
        let (registry, goal) = catalog(length);
        let goal = Goal::fact(goal);
        group.throughput(Throughput::Elements(registry.len() as u64));

        group.bench_with_input(BenchmarkId::new("goal", length), &goal, |b, goal| {
            let planner = Planner::new(&registry, &features);
            b.iter(|| black_box(planner.plan(&TagState::new(), black_box(goal)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("maximal", length), &length, |b, _| {
            let planner = Planner::new(&registry, &features);
            b.iter(|| black_box(planner.plan(&TagState::new(), &Goal::Maximal).unwrap()));
        });
    }
    group.finish();
}

/// Execution cost of a short plan over a wide tree
fn bench_execute(c: &mut Criterion) {
    let (registry, goal) = catalog(8);
    let goal = Goal::fact(goal);
    let features = Features::new();
    let executor = Executor::new(ExecutorConfig::new()).unwrap();
    let adapters = AdapterSet::default();

    let mut group = c.benchmark_group("execute");
    for methods in [4, 32] {
        group.throughput(Throughput::Elements((64 * methods) as u64));
        group.bench_with_input(
            BenchmarkId::new("chain-8", 64 * methods),
            &methods,
            |b, methods| {
                b.iter_batched(
                    || {
                        let plan = Planner::new(&registry, &features)
                            .plan(&TagState::new(), &goal)
                            .unwrap();
                        (plan, Session::new(program(64, *methods), features.clone()))
                    },
                    |(plan, mut session)| {
                        let report = executor
                            .execute(plan, &registry, &adapters, &mut session)
                            .unwrap();
                        black_box(report)
                    },
                    criterion::BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_plan, bench_execute);
criterion_main!(benches);
