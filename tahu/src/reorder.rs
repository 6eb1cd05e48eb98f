// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Out-of-order buffering keyed by `(server, edge node)`.
//!
//! Network reordering is rare but not impossible across MQTT brokers; a
//! small window of look-ahead turns most reorderings back into the strict
//! `seq` chain the session tracker demands.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use codec::EdgeNodeDescriptor;

use crate::config::ReorderConfig;

/// Outcome of ingesting one sequenced message.
#[derive(Debug, PartialEq, Eq)]
pub enum Ingest<T> {
    /// Deliver these messages now, in sequence order.
    Deliver(Vec<T>),

    /// Held back until the gap before it closes.
    Buffered,

    /// The gap cannot be repaired by buffering: too far ahead, a stale
    /// duplicate, or the buffer is full.
    Gap { expected: u8, got: u8 },
}

/// An unresolved gap reported by a timeout sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleGap {
    pub server_name: String,
    pub node: EdgeNodeDescriptor,
    pub expected: u8,
    pub oldest_buffered: u8,
}

#[derive(Debug)]
struct NodeBuffer<T> {
    next_expected: Option<u8>,
    entries: BTreeMap<u8, (T, Instant)>,
    gap_reported: bool,
}

impl<T> Default for NodeBuffer<T> {
    fn default() -> Self {
        Self {
            next_expected: None,
            entries: BTreeMap::new(),
            gap_reported: false,
        }
    }
}

impl<T> NodeBuffer<T> {
    /// Pop the contiguous run starting at `next_expected`.
    fn drain_run(&mut self, out: &mut Vec<T>) {
        while let Some(next) = self.next_expected {
            match self.entries.remove(&next) {
                Some((message, _arrived)) => {
                    out.push(message);
                    self.next_expected = Some(next.wrapping_add(1));
                }
                None => break,
            }
        }
    }

    /// Drop buffered entries that are no longer ahead of `next_expected`.
    fn drop_stale(&mut self, window: u8) {
        let Some(expected) = self.next_expected else {
            return;
        };
        self.entries
            .retain(|seq, _| seq.wrapping_sub(expected) <= window);
    }
}

/// Per-node reorder buffers of one dispatch shard.
#[derive(Debug)]
pub struct ReorderManager<T> {
    config: ReorderConfig,
    buffers: HashMap<(String, EdgeNodeDescriptor), NodeBuffer<T>>,
}

impl<T> ReorderManager<T> {
    #[must_use]
    pub fn new(config: ReorderConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
        }
    }

    /// An NBIRTH re-anchors the chain at `seq`: buffered entries that are
    /// now in the past are dropped, and any run that became contiguous is
    /// returned for delivery (after the birth itself).
    pub fn accept_birth(
        &mut self,
        server_name: &str,
        node: &EdgeNodeDescriptor,
        seq: u8,
    ) -> Vec<T> {
        let window = self.config.window();
        let buffer = self.buffer(server_name, node);
        buffer.next_expected = Some(seq.wrapping_add(1));
        buffer.gap_reported = false;
        buffer.drop_stale(window);
        let mut run = Vec::new();
        buffer.drain_run(&mut run);
        run
    }

    /// Ingest a sequenced message.
    pub fn ingest(
        &mut self,
        server_name: &str,
        node: &EdgeNodeDescriptor,
        seq: u8,
        message: T,
        now: Instant,
    ) -> Ingest<T> {
        let window = self.config.window();
        let capacity = self.config.capacity();
        let buffer = self.buffer(server_name, node);

        let Some(expected) = buffer.next_expected else {
            // Chain not anchored yet; pass through and let the session
            // tracker judge it.
            return Ingest::Deliver(vec![message]);
        };

        let distance = seq.wrapping_sub(expected);
        if distance == 0 {
            buffer.next_expected = Some(seq.wrapping_add(1));
            buffer.gap_reported = false;
            let mut run = vec![message];
            buffer.drain_run(&mut run);
            return Ingest::Deliver(run);
        }

        if distance <= window {
            if buffer.entries.len() >= capacity {
                log::warn!(
                    "Reorder buffer full for {node} on {server_name}, expected {expected}"
                );
                return Ingest::Gap { expected, got: seq };
            }
            log::debug!(
                "Buffering seq {seq} for {node} on {server_name}, expected {expected}"
            );
            buffer.entries.insert(seq, (message, now));
            return Ingest::Buffered;
        }

        // Too far ahead, or a duplicate from the past.
        Ingest::Gap { expected, got: seq }
    }

    /// Report buffers whose oldest entry has waited longer than the
    /// configured timeout. Each gap is reported once until progress is
    /// made on the node's chain.
    pub fn sweep(&mut self, now: Instant) -> Vec<StaleGap> {
        let timeout = self.config.timeout();
        let mut stale = Vec::new();
        for ((server_name, node), buffer) in &mut self.buffers {
            if buffer.gap_reported {
                continue;
            }
            let Some(expected) = buffer.next_expected else {
                continue;
            };
            let Some((oldest_seq, (_, arrived))) = buffer.entries.iter().next() else {
                continue;
            };
            if now.duration_since(*arrived) >= timeout {
                buffer.gap_reported = true;
                stale.push(StaleGap {
                    server_name: server_name.clone(),
                    node: node.clone(),
                    expected,
                    oldest_buffered: *oldest_seq,
                });
            }
        }
        stale
    }

    fn buffer(&mut self, server_name: &str, node: &EdgeNodeDescriptor) -> &mut NodeBuffer<T> {
        self.buffers
            .entry((server_name.to_string(), node.clone()))
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn manager(window: u8, capacity: usize) -> ReorderManager<u8> {
        let mut config = ReorderConfig::enabled();
        config.set_window(window).set_capacity(capacity);
        ReorderManager::new(config)
    }

    fn node() -> EdgeNodeDescriptor {
        EdgeNodeDescriptor::new("G", "E")
    }

    #[test]
    fn test_in_order_passes_through() {
        let mut mgr = manager(10, 25);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let now = Instant::now();

        assert_eq!(mgr.ingest("s", &node, 1, 1, now), Ingest::Deliver(vec![1]));
        assert_eq!(mgr.ingest("s", &node, 2, 2, now), Ingest::Deliver(vec![2]));
    }

    #[test]
    fn test_buffered_run_released_in_order() {
        let mut mgr = manager(10, 25);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let now = Instant::now();

        // 3 and 2 run ahead of 1.
        assert_eq!(mgr.ingest("s", &node, 3, 3, now), Ingest::Buffered);
        assert_eq!(mgr.ingest("s", &node, 2, 2, now), Ingest::Buffered);
        assert_eq!(
            mgr.ingest("s", &node, 1, 1, now),
            Ingest::Deliver(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_gap_beyond_window() {
        let mut mgr = manager(4, 25);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let now = Instant::now();

        assert_eq!(
            mgr.ingest("s", &node, 6, 6, now),
            Ingest::Gap {
                expected: 1,
                got: 6
            }
        );
    }

    #[test]
    fn test_duplicate_from_past_is_gap() {
        let mut mgr = manager(4, 25);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let now = Instant::now();

        assert_eq!(mgr.ingest("s", &node, 1, 1, now), Ingest::Deliver(vec![1]));
        assert_eq!(
            mgr.ingest("s", &node, 1, 1, now),
            Ingest::Gap {
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_capacity_limit() {
        let mut mgr = manager(10, 2);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let now = Instant::now();

        assert_eq!(mgr.ingest("s", &node, 3, 3, now), Ingest::Buffered);
        assert_eq!(mgr.ingest("s", &node, 4, 4, now), Ingest::Buffered);
        assert_eq!(
            mgr.ingest("s", &node, 5, 5, now),
            Ingest::Gap {
                expected: 1,
                got: 5
            }
        );
    }

    #[test]
    fn test_birth_resets_and_flushes() {
        let mut mgr = manager(10, 25);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let now = Instant::now();

        assert_eq!(mgr.ingest("s", &node, 5, 5, now), Ingest::Buffered);
        assert_eq!(mgr.ingest("s", &node, 2, 2, now), Ingest::Buffered);

        // Rebirth with seq 4: 2 is stale and dropped, 5 becomes the head
        // of a contiguous run.
        let flushed = mgr.accept_birth("s", &node, 4);
        assert_eq!(flushed, vec![5]);
        assert_eq!(mgr.ingest("s", &node, 6, 6, now), Ingest::Deliver(vec![6]));
    }

    #[test]
    fn test_wrap_around_at_255() {
        let mut mgr = manager(10, 25);
        let node = node();
        mgr.accept_birth("s", &node, 254);
        let now = Instant::now();

        assert_eq!(mgr.ingest("s", &node, 0, 0, now), Ingest::Buffered);
        assert_eq!(
            mgr.ingest("s", &node, 255, 255, now),
            Ingest::Deliver(vec![255, 0])
        );
    }

    #[test]
    fn test_sweep_reports_once() {
        let mut mgr = manager(10, 25);
        let node = node();
        mgr.accept_birth("s", &node, 0);
        let start = Instant::now();

        assert_eq!(mgr.ingest("s", &node, 3, 3, start), Ingest::Buffered);
        assert!(mgr.sweep(start).is_empty());

        let later = start + Duration::from_secs(6);
        let stale = mgr.sweep(later);
        assert_eq!(
            stale,
            vec![StaleGap {
                server_name: "s".to_string(),
                node: node.clone(),
                expected: 1,
                oldest_buffered: 3,
            }]
        );

        // Not re-reported until the chain moves.
        assert!(mgr.sweep(later + Duration::from_secs(6)).is_empty());
    }

    #[test]
    fn test_unanchored_passes_through() {
        let mut mgr = manager(10, 25);
        let node = node();
        let now = Instant::now();
        assert_eq!(mgr.ingest("s", &node, 9, 9, now), Ingest::Deliver(vec![9]));
    }
}
