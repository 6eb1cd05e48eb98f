// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Connection and message accounting of one client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Availability {
    uptime: Duration,
    downtime: Duration,
    online_since: Option<Instant>,
    offline_since: Option<Instant>,
}

impl Availability {
    /// Fold the open interval into the accumulators at `now`.
    fn settle(&mut self, now: Instant) {
        if let Some(since) = self.online_since.take() {
            self.uptime += now.duration_since(since);
        }
        if let Some(since) = self.offline_since.take() {
            self.downtime += now.duration_since(since);
        }
    }
}

/// Observable counters of one client. All methods are lock-cheap and
/// callable from any task.
#[derive(Debug, Default)]
pub struct ClientStats {
    connection_count: AtomicU64,
    messages_arrived: AtomicU64,
    messages_at_last_query: AtomicU64,
    availability: Mutex<Availability>,
}

impl ClientStats {
    #[must_use]
    pub fn new() -> Self {
        let stats = Self::default();
        stats.lock().offline_since = Some(Instant::now());
        stats
    }

    /// Record a successful (re)connection.
    pub fn on_connected(&self) {
        self.connection_count.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        let now = Instant::now();
        inner.settle(now);
        inner.online_since = Some(now);
    }

    /// Record a connection loss or teardown.
    pub fn on_disconnected(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.settle(now);
        inner.offline_since = Some(now);
    }

    /// Record one inbound message.
    pub fn on_message_arrived(&self) {
        self.messages_arrived.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_arrived(&self) -> u64 {
        self.messages_arrived.load(Ordering::Relaxed)
    }

    /// Messages arrived since the previous call of this method.
    pub fn messages_arrived_delta(&self) -> u64 {
        let total = self.messages_arrived.load(Ordering::Relaxed);
        let last = self.messages_at_last_query.swap(total, Ordering::Relaxed);
        total.saturating_sub(last)
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        let inner = self.lock();
        let open = inner
            .online_since
            .map_or(Duration::ZERO, |since| since.elapsed());
        inner.uptime + open
    }

    #[must_use]
    pub fn downtime(&self) -> Duration {
        let inner = self.lock();
        let open = inner
            .offline_since
            .map_or(Duration::ZERO, |since| since.elapsed());
        inner.downtime + open
    }

    /// Availability percentage: `uptime / (uptime + downtime) * 100`.
    #[must_use]
    pub fn availability(&self) -> f64 {
        let uptime = self.uptime().as_secs_f64();
        let downtime = self.downtime().as_secs_f64();
        let total = uptime + downtime;
        if total == 0.0 {
            return 0.0;
        }
        uptime / total * 100.0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Availability> {
        self.availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
