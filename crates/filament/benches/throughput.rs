use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use filament_rs::channel::channel;
use filament_rs::promise::pair;
use filament_rs::ring::RingBuffer;
use std::hint::black_box;

fn ring_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(1));

    let ring = RingBuffer::new(1024);
    group.bench_function("push_pop", |b| {
        b.iter(|| {
            let _ = ring.push(black_box(1u64));
            black_box(ring.pop())
        });
    });

    group.finish();
}

fn channel_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Elements(1));

    let (sender, receiver) = channel::<u64>(1024);
    group.bench_function("try_send_try_receive", |b| {
        b.iter(|| {
            let _ = sender.try_send(black_box(1));
            black_box(receiver.try_receive())
        });
    });

    group.finish();
}

fn promise_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("promise");
    group.throughput(Throughput::Elements(1));

    group.bench_function("resolve_get", |b| {
        b.iter(|| {
            let (promise, future) = pair::<u64, ()>();
            promise.resolve(black_box(7));
            black_box(future.get())
        });
    });

    group.finish();
}

criterion_group!(benches, ring_push_pop, channel_transfer, promise_settle);
criterion_main!(benches);
