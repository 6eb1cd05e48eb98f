// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Sharded host-side dispatcher.
//!
//! Inbound messages are keyed by `group/edge` onto one of N single-worker
//! shards, each with an unbounded FIFO queue. One edge node is therefore
//! strictly serialized while distinct edges proceed in parallel, which
//! keeps the per-node `seq` check authoritative.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use codec::{millis_since_epoch, EdgeNodeDescriptor, MessageType, SparkplugBPayload, Topic};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::alias::AliasMap;
use crate::callback::{ClientCallback, CommandPublisher, HostApplicationEventHandler};
use crate::config::HostConfig;
use crate::error::{Error, ErrorKind};
use crate::node::SessionManager;
use crate::reorder::{Ingest, ReorderManager};

/// Minimum interval between reorder timeout sweeps.
const MIN_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(250);

#[derive(Debug)]
struct InboundMessage {
    server_name: String,
    client_id: String,
    topic: Topic,
    payload: Vec<u8>,
}

#[derive(Debug)]
enum ShardCmd {
    Message(InboundMessage),
    Sweep,
}

/// What one shard buffers while a sequence gap is open.
struct HeldMessage {
    topic: Topic,
    payload: SparkplugBPayload,
}

struct ShardContext {
    sessions: Arc<SessionManager>,
    aliases: Arc<AliasMap>,
    handler: Arc<dyn HostApplicationEventHandler>,
    commands: Option<Arc<dyn CommandPublisher>>,
}

/// Sharded executor routing decoded Sparkplug messages to the host
/// application event handler.
pub struct HostDispatcher {
    config: HostConfig,
    senders: Vec<mpsc::UnboundedSender<ShardCmd>>,
    workers: Vec<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
    sessions: Arc<SessionManager>,
}

impl HostDispatcher {
    /// Spawn the shard workers (and the sweep timer when reordering is
    /// enabled).
    ///
    /// # Errors
    ///
    /// Returns error if `config` does not validate.
    pub fn new(
        config: HostConfig,
        handler: Arc<dyn HostApplicationEventHandler>,
        commands: Option<Arc<dyn CommandPublisher>>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let sessions = Arc::new(SessionManager::new());
        let context = Arc::new(ShardContext {
            sessions: Arc::clone(&sessions),
            aliases: Arc::new(AliasMap::new()),
            handler,
            commands,
        });

        let mut senders = Vec::with_capacity(config.shard_count());
        let mut workers = Vec::with_capacity(config.shard_count());
        for _ in 0..config.shard_count() {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            workers.push(tokio::spawn(shard_loop(
                rx,
                Arc::clone(&context),
                config.reorder().clone(),
            )));
        }

        let sweeper = if config.reorder().is_enabled() {
            let interval = (config.reorder().timeout() / 2).max(MIN_SWEEP_INTERVAL);
            let sweep_senders = senders.clone();
            Some(tokio::spawn(async move {
                let mut timer = tokio::time::interval(interval);
                timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    timer.tick().await;
                    for sender in &sweep_senders {
                        if sender.send(ShardCmd::Sweep).is_err() {
                            return;
                        }
                    }
                }
            }))
        } else {
            None
        };

        Ok(Self {
            config,
            senders,
            workers,
            sweeper,
            sessions,
        })
    }

    /// Session registry shared with the shard workers.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Route one raw MQTT message. Non-Sparkplug topics are logged and
    /// dropped.
    pub fn dispatch(
        &self,
        server_name: &str,
        client_id: &str,
        topic_str: &str,
        payload: &[u8],
    ) {
        if !topic_str.starts_with(codec::NAMESPACE) {
            log::debug!("Dropping non-Sparkplug message on {topic_str}");
            return;
        }
        let topic = match Topic::parse(topic_str) {
            Ok(topic) => topic,
            Err(err) => {
                log::warn!("Dropping unparsable topic {topic_str}: {err}");
                return;
            }
        };
        let Some(node) = topic.edge_node() else {
            log::debug!("Dropping non-node message on {topic_str}");
            return;
        };

        let index = shard_index(&node, self.senders.len());
        let message = InboundMessage {
            server_name: server_name.to_string(),
            client_id: client_id.to_string(),
            topic,
            payload: payload.to_vec(),
        };
        if self.senders[index].send(ShardCmd::Message(message)).is_err() {
            log::error!("Shard {index} is gone, dropping message on {topic_str}");
        }
    }

    /// Stop the workers and wait for their queues to drain.
    pub async fn shutdown(mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        self.senders.clear();
        let workers = std::mem::take(&mut self.workers);
        futures::future::join_all(workers).await;
        log::info!("Host dispatcher stopped ({} shards)", self.config.shard_count());
    }
}

impl ClientCallback for HostDispatcher {
    fn message_arrived(
        &self,
        server_name: &str,
        _server_url: &str,
        client_id: &str,
        topic: &str,
        payload: &[u8],
    ) {
        self.dispatch(server_name, client_id, topic, payload);
    }

    fn connection_lost(&self, server_name: &str, reason: &Error) {
        log::warn!("Host connection to {server_name} lost: {reason}");
    }
}

/// `|hash(group + '/' + edge)| mod N`.
fn shard_index(node: &EdgeNodeDescriptor, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    format!("{}/{}", node.group_id, node.edge_node_id).hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as usize
}

async fn shard_loop(
    mut rx: mpsc::UnboundedReceiver<ShardCmd>,
    context: Arc<ShardContext>,
    reorder_config: crate::config::ReorderConfig,
) {
    let reorder_enabled = reorder_config.is_enabled();
    let mut reorder: ReorderManager<HeldMessage> = ReorderManager::new(reorder_config);
    while let Some(cmd) = rx.recv().await {
        match cmd {
            ShardCmd::Message(message) => {
                process_message(&context, reorder_enabled.then_some(&mut reorder), message);
            }
            ShardCmd::Sweep => {
                for gap in reorder.sweep(Instant::now()) {
                    let err = Error::sequence_gap(gap.expected, gap.oldest_buffered);
                    log::warn!(
                        "Reorder timeout for {} on {}: {err}",
                        gap.node,
                        gap.server_name
                    );
                    request_rebirth(&context, &gap.node, &err);
                }
            }
        }
    }
}

fn process_message(
    context: &ShardContext,
    reorder: Option<&mut ReorderManager<HeldMessage>>,
    message: InboundMessage,
) {
    let InboundMessage {
        server_name,
        client_id,
        topic,
        payload,
    } = message;

    let Some(message_type) = topic.message_type() else {
        return;
    };
    let Some(node) = topic.edge_node() else {
        return;
    };

    let mut payload = match codec::decode(payload.as_slice()) {
        Ok(payload) => payload,
        Err(err) => {
            log::warn!("Dropping undecodable payload on {topic}: {err}");
            request_rebirth(&context, &node, &err.into());
            return;
        }
    };

    let session = context.sessions.node(&node, &server_name, &client_id);

    match message_type {
        MessageType::NBirth => {
            let (Some(timestamp), Some(bd_seq), Some(seq)) =
                (payload.timestamp, payload.bd_seq(), payload.seq)
            else {
                log::warn!("Dropping NBIRTH without timestamp/bdSeq/seq for {node}");
                return;
            };
            if let Err(err) = session.set_online(timestamp, bd_seq, seq) {
                log::warn!("Dropping invalid NBIRTH for {node}: {err}");
                return;
            }
            context.aliases.register_birth(&node, &payload);
            context.handler.on_node_birth(&node, &payload);
            if let Some(reorder) = reorder {
                let released = reorder.accept_birth(&server_name, &node, (seq & 0xff) as u8);
                for held in released {
                    deliver(context, &session, held.topic, held.payload);
                }
            }
        }
        MessageType::NDeath => {
            let Some(bd_seq) = payload.bd_seq() else {
                log::warn!("Dropping NDEATH without bdSeq for {node}");
                return;
            };
            let timestamp = payload.timestamp.unwrap_or_else(millis_since_epoch);
            if session.set_offline(timestamp, bd_seq) {
                context.aliases.forget(&node);
                context.handler.on_node_death(&node, Some(bd_seq));
            }
        }
        _ if message_type.in_seq_chain() => {
            context.aliases.apply(&node, &mut payload);
            let Some(seq) = payload.seq else {
                let err = Error::new(ErrorKind::SequenceGap, "Payload without seq");
                log::warn!("Dropping {message_type} without seq for {node}");
                request_rebirth(&context, &node, &err);
                return;
            };
            let seq8 = (seq & 0xff) as u8;

            match reorder {
                Some(reorder) => {
                    let held = HeldMessage { topic, payload };
                    match reorder.ingest(&server_name, &node, seq8, held, Instant::now()) {
                        Ingest::Deliver(run) => {
                            for held in run {
                                deliver(context, &session, held.topic, held.payload);
                            }
                        }
                        Ingest::Buffered => {}
                        Ingest::Gap { expected, got } => {
                            let err = Error::sequence_gap(expected, got);
                            request_rebirth(&context, &node, &err);
                        }
                    }
                }
                None => deliver(context, &session, topic, payload),
            }
        }
        _ => {
            log::debug!("Ignoring {message_type} on {topic}");
        }
    }
}

/// Advance the node's `seq` chain, then hand the payload to the event
/// handler. A broken chain drops the message and requests a rebirth.
fn deliver(
    context: &ShardContext,
    session: &crate::node::SparkplugEdgeNode,
    topic: Topic,
    payload: SparkplugBPayload,
) {
    let Some(message_type) = topic.message_type() else {
        return;
    };
    let Some(node) = topic.edge_node() else {
        return;
    };

    let Some(seq) = payload.seq else {
        return;
    };
    if let Err(err) = session.advance(seq) {
        log::warn!("Sequence gap for {node}: {err}");
        request_rebirth(context, &node, &err);
        return;
    }

    let timestamp = payload.timestamp.unwrap_or_else(millis_since_epoch);
    match message_type {
        MessageType::NData => context.handler.on_node_data(&node, &payload),
        MessageType::NCmd => context.handler.on_command(&node, &payload),
        MessageType::DBirth => {
            if let Some(device) = topic.device_descriptor() {
                session.device_online(&device.device_id, timestamp);
                context.handler.on_device_birth(&device, &payload);
            }
        }
        MessageType::DDeath => {
            if let Some(device) = topic.device_descriptor() {
                session.device_offline(&device.device_id, timestamp);
                context.handler.on_device_death(&device, &payload);
            }
        }
        MessageType::DData => {
            if let Some(device) = topic.device_descriptor() {
                context.handler.on_device_data(&device, &payload);
            }
        }
        MessageType::DCmd => context.handler.on_command(&node, &payload),
        MessageType::NBirth | MessageType::NDeath | MessageType::State => {}
    }
}

/// Ask the edge node for a fresh BIRTH and tell the handler why.
fn request_rebirth(context: &ShardContext, node: &EdgeNodeDescriptor, reason: &Error) {
    if let Some(commands) = &context.commands {
        let payload = SparkplugBPayload::rebirth_request(millis_since_epoch());
        if let Err(err) = commands.publish_node_command(node, payload) {
            log::warn!("Failed to publish rebirth NCMD to {node}: {err}");
        }
    }
    context.handler.on_rebirth_requested(node, reason);
}
