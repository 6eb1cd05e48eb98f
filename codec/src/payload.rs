// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::Metric;

/// An in-memory Sparkplug B payload: the unit published on every
/// Sparkplug topic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SparkplugBPayload {
    /// Milliseconds since the Unix epoch.
    pub timestamp: Option<u64>,
    /// Per-edge-node message sequence number, 0..=255.
    pub seq: Option<u64>,
    pub uuid: Option<String>,
    pub metrics: Vec<Metric>,
    /// Opaque application bytes.
    pub body: Option<Vec<u8>>,
}

impl SparkplugBPayload {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a payload stamped with the current wall clock.
    #[must_use]
    pub fn now() -> Self {
        Self {
            timestamp: Some(millis_since_epoch()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn add_metric(&mut self, metric: Metric) -> &mut Self {
        self.metrics.push(metric);
        self
    }

    /// Find a metric by name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics
            .iter()
            .find(|m| m.name.as_deref() == Some(name))
    }

    /// Value of the `bdSeq` metric, if present.
    #[must_use]
    pub fn bd_seq(&self) -> Option<u64> {
        self.metrics.iter().find_map(Metric::bd_seq_value)
    }

    /// Build the NCMD payload requesting a node rebirth.
    #[must_use]
    pub fn rebirth_request(timestamp: u64) -> Self {
        let mut payload = Self::new().with_timestamp(timestamp);
        payload.add_metric(Metric::rebirth_request());
        payload
    }

    /// Build an NBIRTH/NDEATH skeleton: timestamp, seq and the leading
    /// `bdSeq` metric.
    #[must_use]
    pub fn birth_skeleton(timestamp: u64, seq: u64, bd_seq: u64) -> Self {
        let mut payload = Self::new().with_timestamp(timestamp).with_seq(seq);
        payload.add_metric(Metric::bd_seq(bd_seq));
        payload
    }

    /// Alias registrations declared by a birth payload: every metric
    /// carrying both a name and an alias.
    pub fn alias_pairs(&self) -> impl Iterator<Item = (&str, u64)> {
        self.metrics.iter().filter_map(|m| {
            m.name
                .as_deref()
                .and_then(|name| m.alias.map(|alias| (name, alias)))
        })
    }
}

/// Current wall clock in milliseconds since the Unix epoch.
#[must_use]
pub fn millis_since_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// STATE topic payload bodies for Primary Host announcement.
#[must_use]
pub const fn state_payload(online: bool) -> &'static [u8] {
    if online {
        b"ONLINE"
    } else {
        b"OFFLINE"
    }
}
