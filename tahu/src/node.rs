// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Per-edge-node session state: birth/death lifecycle and the monotonic
//! `seq` chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use codec::EdgeNodeDescriptor;

use crate::error::{Error, ErrorKind};

/// A rolling 0..=255 counter for edge-side `seq`/`bdSeq` assignment.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU8);

impl SequenceCounter {
    #[must_use]
    pub const fn new(start: u8) -> Self {
        Self(AtomicU8::new(start))
    }

    /// Return the current value and advance, wrapping at 256.
    pub fn next(&self) -> u8 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    pub fn peek(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Session view of one device attached to an edge node.
#[derive(Debug, Default, Clone)]
pub struct SparkplugDevice {
    pub online: bool,
    /// Milliseconds since the Unix epoch.
    pub online_date: Option<u64>,
    pub offline_date: Option<u64>,
}

#[derive(Debug, Default)]
struct NodeState {
    online: bool,
    online_date: Option<u64>,
    offline_date: Option<u64>,
    birth_bd_seq: Option<u8>,
    last_seq: Option<u8>,
    devices: HashMap<String, SparkplugDevice>,
}

/// Session state of one edge node, tied to the MQTT session it was seen
/// on. All mutations go through the per-node lock.
#[derive(Debug)]
pub struct SparkplugEdgeNode {
    descriptor: EdgeNodeDescriptor,
    mqtt_server_name: String,
    mqtt_client_id: String,
    state: Mutex<NodeState>,
}

impl SparkplugEdgeNode {
    #[must_use]
    pub fn new(
        descriptor: EdgeNodeDescriptor,
        mqtt_server_name: &str,
        mqtt_client_id: &str,
    ) -> Self {
        Self {
            descriptor,
            mqtt_server_name: mqtt_server_name.to_string(),
            mqtt_client_id: mqtt_client_id.to_string(),
            state: Mutex::new(NodeState::default()),
        }
    }

    #[must_use]
    pub const fn descriptor(&self) -> &EdgeNodeDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn mqtt_server_name(&self) -> &str {
        &self.mqtt_server_name
    }

    #[must_use]
    pub fn mqtt_client_id(&self) -> &str {
        &self.mqtt_client_id
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.lock_state().online
    }

    #[must_use]
    pub fn birth_bd_seq(&self) -> Option<u8> {
        self.lock_state().birth_bd_seq
    }

    #[must_use]
    pub fn last_seq(&self) -> Option<u8> {
        self.lock_state().last_seq
    }

    /// Register an NBIRTH: the node moves Online and the `seq` chain is
    /// re-anchored. All three payload fields are mandatory on NBIRTH and
    /// must be in 0..=255 where narrow.
    ///
    /// # Errors
    ///
    /// Returns error if `bd_seq` or `seq` exceeds 255.
    pub fn set_online(&self, timestamp: u64, bd_seq: u64, seq: u64) -> Result<(), Error> {
        let bd_seq = narrow_seq(bd_seq)?;
        let seq = narrow_seq(seq)?;

        let mut state = self.lock_state();
        state.online = true;
        state.online_date = Some(timestamp);
        state.birth_bd_seq = Some(bd_seq);
        state.last_seq = Some(seq);
        log::info!(
            "Edge node {} online, bdSeq {bd_seq}, seq {seq}",
            self.descriptor
        );
        Ok(())
    }

    /// Register an NDEATH. A death whose `bd_seq` does not pair with the
    /// registered birth is ignored; returns whether the death was applied.
    pub fn set_offline(&self, timestamp: u64, bd_seq: u64) -> bool {
        let mut state = self.lock_state();
        if state.birth_bd_seq.map(u64::from) != Some(bd_seq) {
            log::debug!(
                "Ignoring NDEATH for {} with stale bdSeq {bd_seq}, registered {:?}",
                self.descriptor,
                state.birth_bd_seq
            );
            return false;
        }
        state.online = false;
        state.offline_date = Some(timestamp);
        state.last_seq = None;
        for device in state.devices.values_mut() {
            if device.online {
                device.online = false;
                device.offline_date = Some(timestamp);
            }
        }
        log::info!("Edge node {} offline, bdSeq {bd_seq}", self.descriptor);
        true
    }

    /// Advance the `seq` chain: `seq` must equal `(last_seq + 1) mod 256`.
    ///
    /// # Errors
    ///
    /// Returns `SequenceGap` if the chain is not anchored (no NBIRTH seen)
    /// or `seq` is not the successor.
    pub fn advance(&self, seq: u64) -> Result<(), Error> {
        let mut state = self.lock_state();
        let Some(last) = state.last_seq else {
            return Err(Error::from_string(
                ErrorKind::SequenceGap,
                format!("No NBIRTH seen for {}", self.descriptor),
            ));
        };
        // The chain advances even on mismatch; the caller reacts with a
        // rebirth request.
        let expected = last.wrapping_add(1);
        state.last_seq = Some(expected);
        if u64::from(expected) != seq {
            return Err(Error::sequence_gap(expected, (seq & 0xff) as u8));
        }
        Ok(())
    }

    /// Register a DBIRTH for `device_id`.
    pub fn device_online(&self, device_id: &str, timestamp: u64) {
        let mut state = self.lock_state();
        let device = state.devices.entry(device_id.to_string()).or_default();
        device.online = true;
        device.online_date = Some(timestamp);
    }

    /// Register a DDEATH for `device_id`.
    pub fn device_offline(&self, device_id: &str, timestamp: u64) {
        let mut state = self.lock_state();
        let device = state.devices.entry(device_id.to_string()).or_default();
        device.online = false;
        device.offline_date = Some(timestamp);
    }

    #[must_use]
    pub fn device(&self, device_id: &str) -> Option<SparkplugDevice> {
        self.lock_state().devices.get(device_id).cloned()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, NodeState> {
        // A poisoned node lock means a panic mid-update; state is
        // recovered as-is.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn narrow_seq(v: u64) -> Result<u8, Error> {
    u8::try_from(v).map_err(|_| {
        Error::from_string(ErrorKind::OutOfRange, format!("Sequence number {v} > 255"))
    })
}

/// Shared registry of edge node sessions keyed by descriptor.
#[derive(Debug, Default)]
pub struct SessionManager {
    nodes: RwLock<HashMap<EdgeNodeDescriptor, Arc<SparkplugEdgeNode>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session for `descriptor`, creating it on first sight.
    pub fn node(
        &self,
        descriptor: &EdgeNodeDescriptor,
        mqtt_server_name: &str,
        mqtt_client_id: &str,
    ) -> Arc<SparkplugEdgeNode> {
        if let Some(node) = self.get(descriptor) {
            return node;
        }
        let mut nodes = self
            .nodes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        nodes
            .entry(descriptor.clone())
            .or_insert_with(|| {
                Arc::new(SparkplugEdgeNode::new(
                    descriptor.clone(),
                    mqtt_server_name,
                    mqtt_client_id,
                ))
            })
            .clone()
    }

    #[must_use]
    pub fn get(&self, descriptor: &EdgeNodeDescriptor) -> Option<Arc<SparkplugEdgeNode>> {
        self.nodes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(descriptor)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> SparkplugEdgeNode {
        SparkplugEdgeNode::new(
            EdgeNodeDescriptor::new("Energy", "Gateway01"),
            "Mqtt Server One",
            "host-1",
        )
    }

    #[test]
    fn test_birth_data_death_lifecycle() {
        let node = node();
        assert!(!node.is_online());

        // NBIRTH seq=0 bdSeq=7.
        node.set_online(1000, 7, 0).unwrap();
        assert!(node.is_online());
        assert_eq!(node.birth_bd_seq(), Some(7));
        assert_eq!(node.last_seq(), Some(0));

        // NDATA seq=1 accepted.
        node.advance(1).unwrap();
        assert_eq!(node.last_seq(), Some(1));

        // NDATA seq=3 breaks the chain.
        let err = node.advance(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SequenceGap);

        // NDEATH with stale bdSeq is ignored.
        assert!(!node.set_offline(2000, 6));
        assert!(node.is_online());

        // NDEATH with the paired bdSeq applies.
        assert!(node.set_offline(2000, 7));
        assert!(!node.is_online());
    }

    #[test]
    fn test_seq_wraps_at_256() {
        let node = node();
        node.set_online(1, 0, 255).unwrap();
        node.advance(0).unwrap();
        node.advance(1).unwrap();
    }

    #[test]
    fn test_advance_requires_birth() {
        let node = node();
        assert_eq!(node.advance(1).unwrap_err().kind(), ErrorKind::SequenceGap);
    }

    #[test]
    fn test_birth_field_range() {
        let node = node();
        assert_eq!(
            node.set_online(1, 256, 0).unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
        assert_eq!(
            node.set_online(1, 0, 300).unwrap_err().kind(),
            ErrorKind::OutOfRange
        );
    }

    #[test]
    fn test_death_marks_devices_offline() {
        let node = node();
        node.set_online(1, 1, 0).unwrap();
        node.device_online("Sensor01", 5);
        assert!(node.device("Sensor01").unwrap().online);

        assert!(node.set_offline(9, 1));
        let device = node.device("Sensor01").unwrap();
        assert!(!device.online);
        assert_eq!(device.offline_date, Some(9));
    }

    #[test]
    fn test_sequence_counter_wraps() {
        let counter = SequenceCounter::new(254);
        assert_eq!(counter.next(), 254);
        assert_eq!(counter.next(), 255);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_session_manager_reuses_nodes() {
        let manager = SessionManager::new();
        let descriptor = EdgeNodeDescriptor::new("G", "E");
        let a = manager.node(&descriptor, "server", "client");
        let b = manager.node(&descriptor, "server", "client");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }
}
