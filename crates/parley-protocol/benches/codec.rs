//! Codec benchmarks for parley-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use parley_protocol::{codec, ChatMessage, Frame};

fn message(n: u64, body: &str) -> ChatMessage {
    ChatMessage {
        id: format!("m{n}"),
        text: Some(body.to_string()),
        image_url: None,
        video_url: None,
        msg_by_user_id: "u1".into(),
        seen: false,
        created_at: 1_700_000_000_000 + n,
    }
}

fn bench_encode_message(c: &mut Criterion) {
    let frame = Frame::messages(vec![message(1, &"x".repeat(64))]);
    let encoded_len = codec::encode(&frame).unwrap().len();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(encoded_len as u64));
    group.bench_function("single_message", |b| {
        b.iter(|| codec::encode(black_box(&frame)))
    });
    group.finish();
}

fn bench_decode_message(c: &mut Criterion) {
    let frame = Frame::messages(vec![message(1, &"x".repeat(64))]);
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("single_message", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_roundtrip_history(c: &mut Criterion) {
    let messages = (0..50).map(|n| message(n, "hello there")).collect();
    let frame = Frame::messages(messages);

    c.bench_function("roundtrip_50_messages", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_message,
    bench_decode_message,
    bench_roundtrip_history
);
criterion_main!(benches);
