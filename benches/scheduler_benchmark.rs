use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc,
};

use stealing_webserver::scheduler::ThreadPool;

fn submit_from_outside_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_shared_queue");

    for workers in [1, 2, 4].iter() {
        let pool = ThreadPool::new(*workers).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(workers), workers, |b, _| {
            b.iter(|| {
                let done = Arc::new(AtomicUsize::new(0));
                let (tx, rx) = mpsc::channel();
                for _ in 0..1000 {
                    let done = Arc::clone(&done);
                    let tx = tx.clone();
                    pool.submit(move || {
                        if done.fetch_add(1, Ordering::AcqRel) + 1 == 1000 {
                            let _ = tx.send(());
                        }
                    })
                    .unwrap();
                }
                rx.recv().unwrap();
            });
        });
    }

    group.finish();
}

fn fan_out_from_worker_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_fan_out");

    // 一个任务在工作线程内派生大量子任务，其他线程只能通过窃取分担
    for workers in [1, 2, 4].iter() {
        let pool = ThreadPool::new(*workers).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(workers), workers, |b, _| {
            b.iter(|| {
                let handle = pool.handle();
                let (tx, rx) = mpsc::channel();
                pool.submit(move || {
                    let done = Arc::new(AtomicUsize::new(0));
                    for _ in 0..1000 {
                        let done = Arc::clone(&done);
                        let tx = tx.clone();
                        handle
                            .submit(move || {
                                if done.fetch_add(1, Ordering::AcqRel) + 1 == 1000 {
                                    let _ = tx.send(());
                                }
                            })
                            .unwrap();
                    }
                })
                .unwrap();
                rx.recv().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    submit_from_outside_benchmark,
    fan_out_from_worker_benchmark
);
criterion_main!(benches);
