use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loralink_protocol::codec::{self, TransferPlan};
use loralink_protocol::frame::{CorruptionList, Frame, ReceiverFrame, SenderFrame};
use loralink_protocol::sequence::SeqNumber;
use std::collections::BTreeMap;

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for mtu in [32usize, 128, 254] {
        let payload = Bytes::from(vec![0xA5u8; 10_240.min(TransferPlan::max_transfer_size(mtu))]);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(mtu), &payload, |b, payload| {
            b.iter(|| {
                let frames = codec::split(black_box(payload), mtu).unwrap();
                black_box(frames);
            });
        });
    }

    group.finish();
}

fn bench_reassemble(c: &mut Criterion) {
    let payload = Bytes::from(vec![0x5Au8; 10_240]);
    let frames = codec::split(&payload, 254).unwrap();
    let chunks: BTreeMap<SeqNumber, Bytes> =
        frames.iter().map(|f| (f.seq, f.payload.clone())).collect();

    let mut group = c.benchmark_group("reassemble");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("10kb", |b| {
        b.iter(|| {
            let out = codec::reassemble(black_box(&chunks), frames.len(), payload.len()).unwrap();
            black_box(out);
        });
    });
    group.finish();
}

fn bench_frame_codec(c: &mut Criterion) {
    let frame = Frame::new(SeqNumber::new(17), Bytes::from(vec![0u8; 253]));
    let bytes = frame.to_bytes();

    c.bench_function("data_frame_encode", |b| {
        b.iter(|| {
            let bytes = black_box(&frame).to_bytes();
            black_box(bytes);
        });
    });

    c.bench_function("data_frame_decode", |b| {
        b.iter(|| {
            let decoded = SenderFrame::decode(black_box(&bytes)).unwrap();
            black_box(decoded);
        });
    });
}

fn bench_corruption_list(c: &mut Criterion) {
    let list = CorruptionList::new((0..252).map(SeqNumber::new).collect());
    let bytes = ReceiverFrame::CorruptionList(list).to_bytes();

    c.bench_function("corruption_list_decode_full", |b| {
        b.iter(|| {
            let decoded = ReceiverFrame::decode(black_box(&bytes)).unwrap();
            black_box(decoded);
        });
    });
}

criterion_group!(
    benches,
    bench_split,
    bench_reassemble,
    bench_frame_codec,
    bench_corruption_list
);
criterion_main!(benches);
