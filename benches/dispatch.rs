use criterion::{Criterion, criterion_group, criterion_main};
use stagehand::dispatch::{AffinityDispatcher, AffinityThread, InlineExecutor};
use std::hint::black_box;
use std::sync::Arc;

fn bench_run_blocking(c: &mut Criterion) {
    let affinity = Arc::new(AffinityThread::spawn("bench-affinity").expect("spawn affinity thread"));
    let cross_thread = AffinityDispatcher::new(affinity.clone());
    let inline = AffinityDispatcher::new(Arc::new(InlineExecutor));

    let mut group = c.benchmark_group("run_blocking");
    group.bench_function("cross_thread", |b| {
        b.iter(|| cross_thread.run_blocking(|| Ok::<_, ()>(black_box(21) * 2)))
    });
    group.bench_function("in_place", |b| {
        b.iter(|| inline.run_blocking(|| Ok::<_, ()>(black_box(21) * 2)))
    });
    group.finish();

    affinity.shutdown();
}

fn bench_run_thriftily(c: &mut Criterion) {
    let affinity = Arc::new(AffinityThread::spawn("bench-affinity").expect("spawn affinity thread"));
    let dispatcher = AffinityDispatcher::new(affinity.clone());

    c.bench_function("run_thriftily", |b| {
        b.iter(|| {
            dispatcher.run_thriftily(
                || Ok::<_, ()>(black_box(vec![1u8; 64])),
                |bytes: Vec<u8>| Ok(bytes.len()),
                |len: usize| {
                    black_box(len);
                    Ok(())
                },
            )
        })
    });

    affinity.shutdown();
}

criterion_group!(benches, bench_run_blocking, bench_run_thriftily);
criterion_main!(benches);
