// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Sparkplug B edge and host application library.
//!
//! Built on [`tahu_codec`](codec) for payloads and topics, this crate adds
//! the session layer: the MQTT supervisor ([`TahuClient`]), per-edge-node
//! birth/death and sequence state, optional sequence reordering, the
//! sharded host dispatcher and the periodic edge publisher.

pub mod alias;
pub mod callback;
pub mod client;
pub mod config;
pub mod connect_options;
pub mod dispatcher;
pub mod error;
pub mod node;
pub mod publisher;
pub mod reorder;
pub mod stats;
pub mod status;

pub use alias::AliasMap;
pub use callback::{
    ClientCallback, CommandPublisher, DataSimulator, DeviceDataSink,
    HostApplicationEventHandler, NullCallback,
};
pub use client::TahuClient;
pub use config::{HostConfig, ReorderConfig, DEFAULT_SHARD_COUNT};
pub use connect_options::{ConnectOptions, SessionMessage};
pub use dispatcher::HostDispatcher;
pub use error::{Error, ErrorKind};
pub use node::{SequenceCounter, SessionManager, SparkplugDevice, SparkplugEdgeNode};
pub use publisher::PeriodicPublisher;
pub use reorder::{Ingest, ReorderManager, StaleGap};
pub use stats::ClientStats;
pub use status::ClientStatus;

pub use rumqttc::QoS;
