use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tabletop_core::{FogState, Location, RemoteBoardDiff, TokenMove};
use tabletop_sync::{BoardEvent, BroadcastGroup, ConnectedPeer, OfflineQueue, SyncMessage};
use uuid::Uuid;

/// A typical drag: a handful of moves plus a strip of revealed fog.
fn drag_diff() -> RemoteBoardDiff {
    let mut diff = RemoteBoardDiff::new("bench");
    for i in 0..5 {
        diff.tokens_moved.push(TokenMove {
            id: format!("t{i}"),
            new_location: Location::new(i, i + 1),
        });
    }
    for col in 0..16 {
        diff.fog_of_war
            .push(tabletop_core::CellChange::new(Location::new(col, 3), FogState::None));
    }
    diff
}

fn bench_encode(c: &mut Criterion) {
    let msg = SyncMessage::new(Uuid::new_v4(), 42, BoardEvent::Update(drag_diff()));
    c.bench_function("sync_message_encode", |b| b.iter(|| black_box(msg.encode())));

    let bytes = msg.encode().unwrap();
    c.bench_function("sync_message_decode", |b| {
        b.iter(|| black_box(SyncMessage::decode(black_box(&bytes))))
    });
}

fn bench_broadcast(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let group = BroadcastGroup::new(1024);
    let receivers: Vec<_> = rt.block_on(async {
        let mut receivers = Vec::new();
        for _ in 0..100 {
            receivers.push(
                group
                    .add_peer(ConnectedPeer {
                        conn_id: Uuid::new_v4(),
                        remote_addr: None,
                    })
                    .await,
            );
        }
        receivers
    });
    let msg = SyncMessage::new(Uuid::new_v4(), 1, BoardEvent::Update(drag_diff()));

    c.bench_function("broadcast_100_peers", |b| {
        b.iter(|| black_box(group.broadcast(Uuid::nil(), &msg)))
    });
    drop(receivers);
}

fn bench_offline_replay(c: &mut Criterion) {
    c.bench_function("offline_queue_1k", |b| {
        b.iter(|| {
            let mut queue = OfflineQueue::new(1_000);
            for clock in 0..1_000 {
                queue.enqueue(clock, BoardEvent::SetActive("bench".into()));
            }
            black_box(queue.drain())
        })
    });
}

criterion_group!(benches, bench_encode, bench_broadcast, bench_offline_replay);
criterion_main!(benches);
