//! Codec throughput benchmarks.
//!
//! Mouse moves dominate session traffic, so encode/decode of that variant is
//! the number that matters for input latency.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mouseshare_core::{decode_frame, encode_event, Event, MouseMoveEvent};

fn bench_encode_mouse_move(c: &mut Criterion) {
    let event = Event::MouseMove(MouseMoveEvent { x: 960, y: 540, dx: 3, dy: -2 });
    c.bench_function("encode_mouse_move", |b| {
        b.iter(|| encode_event(black_box(&event), black_box(123456)))
    });
}

fn bench_decode_mouse_move(c: &mut Criterion) {
    let frame = encode_event(
        &Event::MouseMove(MouseMoveEvent { x: 960, y: 540, dx: 3, dy: -2 }),
        123456,
    );
    c.bench_function("decode_mouse_move", |b| {
        b.iter(|| decode_frame(black_box(&frame)).unwrap())
    });
}

criterion_group!(benches, bench_encode_mouse_move, bench_decode_mouse_move);
criterion_main!(benches);
