// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-edge ordering of the sharded host dispatcher under concurrent
//! multi-edge ingest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use codec::{encode, EdgeNodeDescriptor, MessageType, SparkplugBPayload, Topic};
use tahu::{HostApplicationEventHandler, HostConfig, HostDispatcher};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<(String, u64)>>,
}

impl RecordingHandler {
    fn snapshot(&self) -> Vec<(String, u64)> {
        self.events.lock().unwrap().clone()
    }
}

impl HostApplicationEventHandler for RecordingHandler {
    fn on_node_birth(&self, node: &EdgeNodeDescriptor, payload: &SparkplugBPayload) {
        self.events
            .lock()
            .unwrap()
            .push((node.edge_node_id.clone(), payload.seq.unwrap_or(999)));
    }

    fn on_node_data(&self, node: &EdgeNodeDescriptor, payload: &SparkplugBPayload) {
        self.events
            .lock()
            .unwrap()
            .push((node.edge_node_id.clone(), payload.seq.unwrap_or(999)));
    }
}

fn birth_bytes(seq: u64, bd_seq: u64) -> Vec<u8> {
    encode(&SparkplugBPayload::birth_skeleton(1000, seq, bd_seq)).unwrap()
}

fn data_bytes(seq: u64) -> Vec<u8> {
    encode(
        &SparkplugBPayload::new()
            .with_timestamp(2000)
            .with_seq(seq),
    )
    .unwrap()
}

async fn wait_for_events(handler: &RecordingHandler, count: usize) {
    for _ in 0..200 {
        if handler.snapshot().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "Timed out waiting for {count} events, got {}",
        handler.snapshot().len()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_edge_fifo_across_edges() {
    init_log();
    const EDGES: usize = 6;
    const DATA_PER_EDGE: u64 = 30;

    let handler = Arc::new(RecordingHandler::default());
    let mut config = HostConfig::new();
    config.set_shard_count(4);
    let dispatcher = HostDispatcher::new(config, Arc::clone(&handler) as _, None).unwrap();

    // Interleave edges the way concurrent brokers would.
    for seq in 0..=DATA_PER_EDGE {
        for edge in 0..EDGES {
            let node = EdgeNodeDescriptor::new("Plant", &format!("edge-{edge}"));
            let (topic, payload) = if seq == 0 {
                (Topic::node(MessageType::NBirth, &node), birth_bytes(0, 1))
            } else {
                (Topic::node(MessageType::NData, &node), data_bytes(seq))
            };
            dispatcher.dispatch("Mqtt Server One", "host-app", &topic, &payload);
        }
    }

    let total = EDGES * (DATA_PER_EDGE as usize + 1);
    wait_for_events(&handler, total).await;

    // Within each edge, seq must be exactly 0..=30 in order.
    let events = handler.snapshot();
    for edge in 0..EDGES {
        let edge_id = format!("edge-{edge}");
        let seqs: Vec<u64> = events
            .iter()
            .filter(|(id, _)| *id == edge_id)
            .map(|(_, seq)| *seq)
            .collect();
        let expected: Vec<u64> = (0..=DATA_PER_EDGE).collect();
        assert_eq!(seqs, expected, "ordering broken for {edge_id}");
    }

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_non_sparkplug_topics_dropped() {
    let handler = Arc::new(RecordingHandler::default());
    let dispatcher =
        HostDispatcher::new(HostConfig::new(), Arc::clone(&handler) as _, None).unwrap();

    dispatcher.dispatch("s", "c", "factory/telemetry", b"junk");
    dispatcher.dispatch("s", "c", "STATE/host-1", b"ONLINE");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handler.snapshot().is_empty());

    dispatcher.shutdown().await;
}
