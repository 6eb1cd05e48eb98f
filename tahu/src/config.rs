// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

pub const DEFAULT_SHARD_COUNT: usize = 100;

const fn default_shard_count() -> usize {
    DEFAULT_SHARD_COUNT
}

const fn default_reorder_window() -> u8 {
    10
}

const fn default_reorder_capacity() -> usize {
    25
}

const fn default_reorder_timeout_ms() -> u64 {
    5000
}

/// Out-of-order buffering of the host dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderConfig {
    /// Disabled by default; the dispatcher then reports gaps immediately.
    #[serde(default)]
    enabled: bool,

    /// How far ahead of the expected `seq` a message may run and still be
    /// buffered, in sequence steps.
    #[serde(default = "default_reorder_window")]
    window: u8,

    /// Buffered messages per edge node before the oldest gap is reported.
    #[serde(default = "default_reorder_capacity")]
    capacity: usize,

    /// How long a gap may stay unresolved before it is reported.
    #[serde(default = "default_reorder_timeout_ms")]
    timeout_ms: u64,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: default_reorder_window(),
            capacity: default_reorder_capacity(),
            timeout_ms: default_reorder_timeout_ms(),
        }
    }
}

impl ReorderConfig {
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn window(&self) -> u8 {
        self.window
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn set_window(&mut self, window: u8) -> &mut Self {
        self.window = window;
        self
    }

    pub fn set_capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity;
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if some options in config are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.enabled && self.window == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Reorder window must be > 0",
            ));
        }
        if self.enabled && self.capacity == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Reorder capacity must be > 0",
            ));
        }
        Ok(())
    }
}

/// Host application main config.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Number of single-worker dispatch shards.
    #[serde(default = "default_shard_count")]
    shard_count: usize,

    #[serde(default)]
    reorder: ReorderConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            reorder: ReorderConfig::default(),
        }
    }
}

impl HostConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn set_shard_count(&mut self, shard_count: usize) -> &mut Self {
        self.shard_count = shard_count;
        self
    }

    #[must_use]
    pub const fn reorder(&self) -> &ReorderConfig {
        &self.reorder
    }

    pub fn set_reorder(&mut self, reorder: ReorderConfig) -> &mut Self {
        self.reorder = reorder;
        self
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if some options in config are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.shard_count == 0 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Shard count must be > 0",
            ));
        }
        self.reorder.validate()
    }
}
