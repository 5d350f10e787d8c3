use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;
use treesync_core::{ChangeRecord, FeatureKind, NodeId, PropertyUpdate};
use treesync_session::{ClientBatch, Frame, SessionConfig, UiSession};
use uuid::Uuid;

fn sample_records(count: u32) -> Vec<ChangeRecord> {
    (0..count)
        .map(|i| ChangeRecord::Put {
            node: NodeId::new(i + 2),
            feature: FeatureKind::ElementProperties.id(),
            key: "value".into(),
            value: json!(format!("cell {i}")),
        })
        .collect()
}

fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame");
    let session = Uuid::new_v4();
    let records = sample_records(100);
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("encode_100_records", |b| {
        b.iter(|| {
            let frame = Frame::changes(session, 1, black_box(&records)).unwrap();
            black_box(frame.encode().unwrap());
        })
    });

    let encoded = Frame::changes(session, 1, &records).unwrap().encode().unwrap();
    group.bench_function("decode_100_records", |b| {
        b.iter(|| {
            let frame = Frame::decode(black_box(&encoded)).unwrap();
            black_box(frame.change_records().unwrap());
        })
    });

    group.finish();
}

fn bench_handle_client_sync(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let session = UiSession::new(SessionConfig::default());
    let input = runtime.block_on(async {
        let input = session
            .with_tree(|tree| {
                let input = tree.create_element("input");
                let root = tree.root();
                tree.append_child(root, input);
                input
            })
            .await
            .unwrap();
        session.flush().await.unwrap();
        input
    });

    let mut group = c.benchmark_group("Session");
    group.throughput(Throughput::Elements(1));
    let mut seq = 0u64;
    group.bench_function("handle_client_sync", |b| {
        b.iter(|| {
            seq += 1;
            let batch = ClientBatch {
                updates: vec![PropertyUpdate {
                    node: input,
                    feature: FeatureKind::ElementProperties.id(),
                    property: "value".into(),
                    value: json!(seq),
                }],
            };
            let frame = Frame::client_sync(session.id(), seq, &batch).unwrap();
            black_box(runtime.block_on(session.handle_frame(frame)).unwrap());
        })
    });
    group.finish();
}

criterion_group!(benches, bench_frame_codec, bench_handle_client_sync);
criterion_main!(benches);
