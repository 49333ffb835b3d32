//! Benchmarks for the Graph Store's grafting and queueing paths: the
//! per-turn hot path the Tree Updater drives (`add_child`,
//! `add_existing_as_child`, `Queue::enqueue`).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ladder_engine::graph::{Graph, NodeLabel};
use ladder_engine::queue::Queue;

const SIZES: &[usize] = &[64, 256, 1024];

/// Builds an IDEA -> ATTRIBUTE -> CONSEQUENCE chain `count` attributes deep,
/// each attribute carrying its own consequence, mirroring the shape a long
/// interview accumulates under one stimulus.
fn build_fanout(count: usize) -> Graph {
    let mut graph = Graph::new_for_stimulus("offline playback");
    let root = graph.root_id();
    let idea = graph.add_child(root, NodeLabel::Idea, "save playlists").unwrap();
    for i in 0..count {
        let attr = graph
            .add_child(idea, NodeLabel::Attribute, format!("attribute {i}"))
            .unwrap();
        graph
            .add_child(attr, NodeLabel::Consequence, format!("consequence {i}"))
            .unwrap();
    }
    graph
}

fn bench_add_child(c: &mut Criterion) {
    let mut group = c.benchmark_group("graft_add_child");
    for &size in SIZES {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || build_fanout(size),
                |mut graph| {
                    let idea = graph.nodes_by_label(NodeLabel::Idea)[0];
                    graph.add_child(idea, NodeLabel::Attribute, "new attribute").unwrap()
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Re-parenting cost: grafting an existing deep node onto a fresh parent,
/// which walks the ancestor chain once for the cycle check (§4.4 dummy
/// resolution does exactly this).
fn bench_add_existing_as_child(c: &mut Criterion) {
    let mut group = c.benchmark_group("graft_reparent");
    for &size in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut graph = build_fanout(size);
                    let idea = graph.nodes_by_label(NodeLabel::Idea)[0];
                    let dummy = graph.add_child(idea, NodeLabel::Irrelevant, "dummy").unwrap();
                    let target = graph.nodes_by_label(NodeLabel::Consequence)[0];
                    (graph, dummy, target)
                },
                |(mut graph, dummy, target)| graph.add_existing_as_child(target, dummy).unwrap(),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_queue_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_enqueue");
    for &size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let graph = build_fanout(size);
            let attrs = graph.nodes_by_label(NodeLabel::Attribute);
            b.iter(|| {
                let mut queue = Queue::new(3);
                for &id in &attrs {
                    queue.enqueue(&graph, id, NodeLabel::Attribute);
                }
                queue
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_add_child, bench_add_existing_as_child, bench_queue_enqueue);
criterion_main!(benches);
