// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Collaborator interfaces the library calls out to.

use codec::{DeviceDescriptor, EdgeNodeDescriptor, SparkplugBPayload};

use crate::error::Error;

/// Transport level callbacks of one [`crate::TahuClient`].
///
/// All methods have empty default bodies; implement the ones of interest.
/// Callbacks are invoked from the supervisor task and must not block.
pub trait ClientCallback: Send + Sync {
    /// The session reached Connected: subscriptions are replayed and the
    /// BIRTH (if configured) is published.
    fn connect_complete(&self, _server_name: &str, _server_url: &str, _client_id: &str) {}

    /// The broker connection dropped without a `disconnect()` call.
    fn connection_lost(&self, _server_name: &str, _reason: &Error) {}

    /// A message arrived on a subscribed topic.
    fn message_arrived(
        &self,
        _server_name: &str,
        _server_url: &str,
        _client_id: &str,
        _topic: &str,
        _payload: &[u8],
    ) {
    }

    /// The client released its resources after a `disconnect()`.
    fn shutdown(&self, _server_name: &str) {}
}

/// No-op callback for clients that poll state instead.
#[derive(Debug, Default, Clone)]
pub struct NullCallback;

impl ClientCallback for NullCallback {}

/// Decoded Sparkplug events delivered to the host application, in
/// per-edge-node arrival order.
pub trait HostApplicationEventHandler: Send + Sync {
    fn on_node_birth(&self, _node: &EdgeNodeDescriptor, _payload: &SparkplugBPayload) {}

    /// An NDEATH whose bdSeq paired with the registered NBIRTH.
    fn on_node_death(&self, _node: &EdgeNodeDescriptor, _bd_seq: Option<u64>) {}

    fn on_node_data(&self, _node: &EdgeNodeDescriptor, _payload: &SparkplugBPayload) {}

    fn on_device_birth(&self, _device: &DeviceDescriptor, _payload: &SparkplugBPayload) {}

    fn on_device_death(&self, _device: &DeviceDescriptor, _payload: &SparkplugBPayload) {}

    fn on_device_data(&self, _device: &DeviceDescriptor, _payload: &SparkplugBPayload) {}

    /// An NCMD/DCMD observed on a subscribed command topic.
    fn on_command(&self, _node: &EdgeNodeDescriptor, _payload: &SparkplugBPayload) {}

    /// The per-node sequence chain broke; the library has already asked
    /// the [`CommandPublisher`] for a rebirth when one is wired.
    fn on_rebirth_requested(&self, _node: &EdgeNodeDescriptor, _reason: &Error) {}
}

/// Emits NCMD/DCMD messages on behalf of the host application.
pub trait CommandPublisher: Send + Sync {
    /// Publish an NCMD to `node`.
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be queued for delivery.
    fn publish_node_command(
        &self,
        node: &EdgeNodeDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<(), Error>;

    /// Publish a DCMD to `device`.
    ///
    /// # Errors
    ///
    /// Returns error if the command cannot be queued for delivery.
    fn publish_device_command(
        &self,
        device: &DeviceDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<(), Error>;
}

/// Supplies device payloads for the periodic edge publisher.
pub trait DataSimulator: Send + Sync {
    fn device_payload(&self, device: &DeviceDescriptor) -> SparkplugBPayload;
}

/// Outbound seam of the periodic publisher: something able to deliver a
/// DDATA payload for a device. Implemented by [`crate::TahuClient`].
pub trait DeviceDataSink: Send + Sync {
    /// Queue a DDATA payload for `device`.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be queued for delivery.
    fn publish_device_data(
        &self,
        device: &DeviceDescriptor,
        payload: &SparkplugBPayload,
    ) -> Result<(), Error>;
}
