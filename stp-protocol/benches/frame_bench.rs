use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stp_protocol::frame::{internet_checksum, Flags, Segment};
use stp_protocol::ple::{Ple, PleConfig};

fn bench_segment_encode(c: &mut Criterion) {
    let payload = Bytes::from(vec![0xA5u8; 500]); // typical segment size
    let segment = Segment::data(1, 1, payload);

    c.bench_function("segment_encode", |b| {
        b.iter(|| {
            let wire = black_box(&segment).encode();
            black_box(wire);
        });
    });
}

fn bench_segment_decode(c: &mut Criterion) {
    let payload = Bytes::from(vec![0xA5u8; 500]);
    let wire = Segment::data(1, 1, payload).encode();

    c.bench_function("segment_decode", |b| {
        b.iter(|| {
            let segment = Segment::decode(black_box(&wire)).unwrap();
            black_box(segment);
        });
    });
}

fn bench_control_encode(c: &mut Criterion) {
    let segment = Segment::control(Flags::ACK, 1, 251);

    c.bench_function("control_encode", |b| {
        b.iter(|| {
            let wire = black_box(&segment).encode();
            black_box(wire);
        });
    });
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("internet_checksum");

    for size in [64usize, 500, 4096] {
        let data = vec![0x5Au8; size];
        group.bench_function(format!("{}_bytes", size), |b| {
            b.iter(|| {
                let sum = internet_checksum(black_box(&data));
                black_box(sum);
            });
        });
    }

    group.finish();
}

fn bench_ple_judge(c: &mut Criterion) {
    let payload = Bytes::from(vec![0u8; 500]);

    c.bench_function("ple_judge", |b| {
        let mut ple = Ple::new(PleConfig {
            p_drop: 0.1,
            p_duplicate: 0.1,
            p_corrupt: 0.1,
            p_order: 0.1,
            max_order: 3,
            p_delay: 0.1,
            max_delay_ms: 50.0,
            seed: 300,
        });
        b.iter(|| {
            ple.reorder_step();
            let fate = ple.judge(Segment::data(1, 1, payload.clone()));
            black_box(fate);
        });
    });
}

criterion_group!(
    benches,
    bench_segment_encode,
    bench_segment_decode,
    bench_control_encode,
    bench_checksum,
    bench_ple_judge
);
criterion_main!(benches);
