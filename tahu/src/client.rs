// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! One logical MQTT session with Sparkplug lifecycle semantics.
//!
//! A [`TahuClient`] owns a supervisor task driving the transport event
//! loop (connect, retry, replay, BIRTH) and a monitor task watching for
//! silent connection loss. Both observe a stop flag at every loop
//! iteration and every bounded sleep, so `disconnect()` never waits on an
//! unbounded operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use codec::{SparkplugBPayload, Topic};
use rand::Rng;
use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Outgoing,
    Packet, QoS, SubscribeFilter, SubscribeReasonCode,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::callback::{ClientCallback, CommandPublisher, DeviceDataSink};
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::stats::ClientStats;
use crate::status::ClientStatus;

/// Poll step of bounded waits.
const WAIT_SLICE: Duration = Duration::from_millis(250);

/// Monitor tick interval.
const MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive disconnected ticks before the monitor declares a loss.
const MONITOR_MISSED_TICKS: u32 = 5;

/// A subscribe/unsubscribe request waiting for its broker ack.
struct PendingRequest {
    filters: Vec<(String, QoS)>,
    reply: Option<oneshot::Sender<Result<(), Error>>>,
    /// Part of the post-connect replay batch: a grant mismatch here
    /// force-disconnects instead of surfacing to a caller.
    replay: bool,
}

#[derive(Debug, Default)]
struct LwtDelivery {
    awaiting: bool,
    pkid: Option<u16>,
    delivered: bool,
}

struct Core {
    status: ClientStatus,
    client: Option<AsyncClient>,
    connected: bool,
    subscriptions: BTreeMap<String, QoS>,
    sub_queue: VecDeque<PendingRequest>,
    sub_inflight: HashMap<u16, PendingRequest>,
    unsub_queue: VecDeque<PendingRequest>,
    unsub_inflight: HashMap<u16, PendingRequest>,
    lwt: LwtDelivery,
    connect_time: Option<SystemTime>,
    disconnect_time: Option<SystemTime>,
    online_date: Option<SystemTime>,
    offline_date: Option<SystemTime>,
    supervisor: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

impl Default for Core {
    fn default() -> Self {
        Self {
            status: ClientStatus::Idle,
            client: None,
            connected: false,
            subscriptions: BTreeMap::new(),
            sub_queue: VecDeque::new(),
            sub_inflight: HashMap::new(),
            unsub_queue: VecDeque::new(),
            unsub_inflight: HashMap::new(),
            lwt: LwtDelivery::default(),
            connect_time: None,
            disconnect_time: None,
            online_date: None,
            offline_date: None,
            supervisor: None,
            monitor: None,
        }
    }
}

struct Shared {
    options: ConnectOptions,
    core: Mutex<Core>,
    stats: ClientStats,
    callback: Arc<dyn ClientCallback>,
    stop: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// One logical MQTT client identified by
/// `(server_name, server_url, client_id)`.
#[derive(Clone)]
pub struct TahuClient {
    shared: Arc<Shared>,
}

impl TahuClient {
    #[must_use]
    pub fn new(options: ConnectOptions, callback: Arc<dyn ClientCallback>) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                core: Mutex::new(Core::default()),
                stats: ClientStats::new(),
                callback,
                stop: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.shared.options
    }

    #[must_use]
    pub fn stats(&self) -> &ClientStats {
        &self.shared.stats
    }

    #[must_use]
    pub fn status(&self) -> ClientStatus {
        self.shared.lock().status
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    #[must_use]
    pub fn connect_time(&self) -> Option<SystemTime> {
        self.shared.lock().connect_time
    }

    #[must_use]
    pub fn disconnect_time(&self) -> Option<SystemTime> {
        self.shared.lock().disconnect_time
    }

    /// Start the supervisor task. No-op if the client is not Idle.
    ///
    /// # Errors
    ///
    /// Returns error if the server url does not validate.
    pub async fn connect(&self) -> Result<(), Error> {
        self.shared.options.parse_server_url()?;

        let mut core = self.shared.lock();
        if core.status != ClientStatus::Idle {
            log::debug!(
                "connect() ignored, client {} is {:?}",
                self.shared.options.server_name(),
                core.status
            );
            return Ok(());
        }
        core.status = ClientStatus::Connecting;
        self.shared.stop.store(false, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        core.supervisor = Some(tokio::spawn(run_supervisor(shared)));
        Ok(())
    }

    /// Tear the session down.
    ///
    /// If connected and `publish_lwt` is set, the configured LWT is
    /// published first; with `wait_for_lwt` the call polls for its
    /// delivery confirmation in 250 ms steps, at most `keep_alive * 4`
    /// iterations. `quiesce` is then granted to in-flight work before the
    /// transport is dropped; the supervisor gets `timeout` to exit before
    /// it is aborted.
    pub async fn disconnect(
        &self,
        quiesce: Duration,
        timeout: Duration,
        send_disconnect: bool,
        publish_lwt: bool,
        wait_for_lwt: bool,
    ) -> Result<(), Error> {
        let shared = &self.shared;
        shared.stop.store(true, Ordering::SeqCst);

        let (client, was_connected, monitor, supervisor) = {
            let mut core = shared.lock();
            core.status = ClientStatus::Disconnecting;
            (
                core.client.clone(),
                core.connected,
                core.monitor.take(),
                core.supervisor.take(),
            )
        };
        if let Some(monitor) = monitor {
            monitor.abort();
        }

        if was_connected && publish_lwt {
            if let (Some(client), Some(lwt)) = (&client, shared.options.lwt()) {
                {
                    let mut core = shared.lock();
                    core.lwt = LwtDelivery {
                        awaiting: true,
                        pkid: None,
                        delivered: false,
                    };
                }
                if let Err(err) = client
                    .publish(&lwt.topic, lwt.qos, lwt.retain, lwt.payload.clone())
                    .await
                {
                    log::warn!("Failed to publish LWT: {err}");
                } else if wait_for_lwt {
                    let iterations = shared.options.keep_alive().as_secs() * 4;
                    let mut delivered = false;
                    for _ in 0..iterations {
                        if shared.lock().lwt.delivered {
                            delivered = true;
                            break;
                        }
                        tokio::time::sleep(WAIT_SLICE).await;
                    }
                    if !delivered {
                        log::warn!(
                            "LWT delivery unconfirmed for {}",
                            shared.options.server_name()
                        );
                    }
                }
            }
        }

        if !quiesce.is_zero() {
            tokio::time::sleep(quiesce).await;
        }

        if send_disconnect {
            if let Some(client) = &client {
                if let Err(err) = client.disconnect().await {
                    log::debug!("Mqtt disconnect failed: {err}");
                }
            }
        }

        if let Some(mut supervisor) = supervisor {
            if tokio::time::timeout(timeout, &mut supervisor).await.is_err() {
                log::warn!(
                    "Supervisor of {} did not exit in {timeout:?}, aborting",
                    shared.options.server_name()
                );
                supervisor.abort();
            }
        }

        {
            let mut core = shared.lock();
            let was_online = core.connected;
            core.client = None;
            core.connected = false;
            core.status = ClientStatus::Idle;
            core.sub_queue.clear();
            core.sub_inflight.clear();
            core.unsub_queue.clear();
            core.unsub_inflight.clear();
            core.lwt = LwtDelivery::default();
            let now = SystemTime::now();
            if was_online {
                core.disconnect_time = Some(now);
            }
            core.offline_date = Some(now);
        }
        if was_connected {
            shared.stats.on_disconnected();
        }
        shared
            .callback
            .shutdown(shared.options.server_name());
        Ok(())
    }

    /// Register interest in `topic` and, while connected, subscribe on
    /// the broker and wait for the ack.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthorized` if the granted QoS differs from the
    /// requested one.
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), Error> {
        // The request is queued under the client lock so that pending
        // entries and outgoing SUBSCRIBE packets stay in the same order.
        let rx = {
            let mut core = self.shared.lock();
            core.subscriptions.insert(topic.to_string(), qos);
            if !core.connected {
                return Ok(());
            }
            let Some(client) = core.client.clone() else {
                return Err(Error::not_connected(self.shared.options.server_name()));
            };
            let (tx, rx) = oneshot::channel();
            core.sub_queue.push_back(PendingRequest {
                filters: vec![(topic.to_string(), qos)],
                reply: Some(tx),
                replay: false,
            });
            if let Err(err) = client.try_subscribe(topic, qos) {
                core.sub_queue.pop_back();
                return Err(err.into());
            }
            rx
        };

        rx.await.map_err(|_| {
            Error::new(ErrorKind::Internal, "Subscribe ack channel closed")
        })?
    }

    /// Drop interest in `topic` and, while connected, unsubscribe on the
    /// broker and wait for the ack.
    ///
    /// # Errors
    ///
    /// Returns error if the broker rejects the request.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        let rx = {
            let mut core = self.shared.lock();
            core.subscriptions.remove(topic);
            if !core.connected {
                return Ok(());
            }
            let Some(client) = core.client.clone() else {
                return Err(Error::not_connected(self.shared.options.server_name()));
            };
            let (tx, rx) = oneshot::channel();
            core.unsub_queue.push_back(PendingRequest {
                filters: vec![(topic.to_string(), QoS::AtMostOnce)],
                reply: Some(tx),
                replay: false,
            });
            if let Err(err) = client.try_unsubscribe(topic) {
                core.unsub_queue.pop_back();
                return Err(err.into());
            }
            rx
        };

        rx.await.map_err(|_| {
            Error::new(ErrorKind::Internal, "Unsubscribe ack channel closed")
        })?
    }

    /// Snapshot of the subscription registry in replay order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.shared
            .lock()
            .subscriptions
            .iter()
            .map(|(topic, qos)| (topic.clone(), *qos))
            .collect()
    }

    /// Publish one message. Fails immediately when not connected.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when there is no live session.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        let client = {
            let core = self.shared.lock();
            if !core.connected {
                return Err(Error::not_connected(self.shared.options.server_name()));
            }
            core.client.clone()
        };
        let Some(client) = client else {
            return Err(Error::not_connected(self.shared.options.server_name()));
        };
        client.publish(topic, qos, retain, payload).await?;
        Ok(())
    }

    /// Publish with retry: up to `num_attempts` tries, sleeping
    /// `retry_delay` whenever the client is not currently connected.
    ///
    /// # Errors
    ///
    /// Returns the last failure after exhausting all attempts.
    pub async fn publish_with_retry(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        retry_delay: Duration,
        num_attempts: u32,
    ) -> Result<(), Error> {
        let mut last_error =
            Error::new(ErrorKind::InvalidArgument, "num_attempts must be > 0");
        for attempt in 1..=num_attempts {
            if self.shared.stopped() {
                return Err(Error::new(ErrorKind::Internal, "Client is shutting down"));
            }
            if !self.is_connected() {
                log::debug!(
                    "Publish attempt {attempt}/{num_attempts} to {topic} while offline"
                );
                tokio::time::sleep(retry_delay).await;
            }
            match self.publish(topic, payload.clone(), qos, retain).await {
                Ok(()) => return Ok(()),
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }
}

impl DeviceDataSink for TahuClient {
    fn publish_device_data(
        &self,
        device: &codec::DeviceDescriptor,
        payload: &SparkplugBPayload,
    ) -> Result<(), Error> {
        let bytes = codec::encode(payload)?;
        let topic = Topic::device(codec::MessageType::DData, device);
        self.try_publish(&topic, bytes, QoS::AtMostOnce, false)
    }
}

impl CommandPublisher for TahuClient {
    fn publish_node_command(
        &self,
        node: &codec::EdgeNodeDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<(), Error> {
        let bytes = codec::encode(&payload)?;
        let topic = Topic::node(codec::MessageType::NCmd, node);
        self.try_publish(&topic, bytes, QoS::AtMostOnce, false)
    }

    fn publish_device_command(
        &self,
        device: &codec::DeviceDescriptor,
        payload: SparkplugBPayload,
    ) -> Result<(), Error> {
        let bytes = codec::encode(&payload)?;
        let topic = Topic::device(codec::MessageType::DCmd, device);
        self.try_publish(&topic, bytes, QoS::AtMostOnce, false)
    }
}

impl TahuClient {
    /// Non-blocking publish used by the sync collaborator seams.
    fn try_publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        let client = {
            let core = self.shared.lock();
            if !core.connected {
                return Err(Error::not_connected(self.shared.options.server_name()));
            }
            core.client.clone()
        };
        let Some(client) = client else {
            return Err(Error::not_connected(self.shared.options.server_name()));
        };
        client.try_publish(topic, qos, retain, payload)?;
        Ok(())
    }
}

/// Sleep `total` in stop-aware slices.
async fn bounded_sleep(shared: &Shared, total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && !shared.stopped() {
        let step = remaining.min(WAIT_SLICE);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
}

async fn run_supervisor(shared: Arc<Shared>) {
    let options = &shared.options;

    if let Some(max) = options.random_startup_delay() {
        if !max.is_zero() {
            let millis = rand::thread_rng().gen_range(0..max.as_millis().max(1) as u64);
            let jitter = Duration::from_millis(millis);
            log::debug!(
                "Startup delay {jitter:?} before connecting {}",
                options.server_name()
            );
            bounded_sleep(&shared, jitter).await;
        }
    }

    let Ok((host, port)) = options.parse_server_url() else {
        // connect() validated already; a failure here is a logic error.
        log::error!("Invalid server url: {}", options.server_url());
        shared.lock().status = ClientStatus::Idle;
        return;
    };

    while !shared.stopped() {
        let mut mqtt_options = MqttOptions::new(options.client_id(), host.clone(), port);
        mqtt_options
            .set_keep_alive(options.keep_alive())
            .set_clean_session(options.clean_session())
            .set_inflight(options.max_inflight())
            .set_max_packet_size(1024 * 1024, 1024 * 1024);
        if let Some((username, password)) = options.credentials() {
            mqtt_options.set_credentials(username, password);
        }
        if let Some(lwt) = options.lwt() {
            mqtt_options.set_last_will(LastWill::new(
                &lwt.topic,
                lwt.payload.clone(),
                lwt.qos,
                lwt.retain,
            ));
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);
        {
            let mut core = shared.lock();
            core.status = ClientStatus::Connecting;
            core.client = Some(client.clone());
        }

        match tokio::time::timeout(options.connect_timeout(), wait_connack(&mut eventloop)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::warn!("Connect to {} failed: {err}", options.server_url());
                if !options.auto_reconnect() {
                    break;
                }
                bounded_sleep(&shared, options.connect_retry_interval()).await;
                continue;
            }
            Err(_elapsed) => {
                log::warn!(
                    "Connect to {} timed out after {:?}",
                    options.server_url(),
                    options.connect_timeout()
                );
                if !options.auto_reconnect() {
                    break;
                }
                bounded_sleep(&shared, options.connect_retry_interval()).await;
                continue;
            }
        }

        if let Err(err) = on_connected(&shared, &client).await {
            // Replay or BIRTH failed: force-disconnect and retry.
            let _ = client.disconnect().await;
            mark_connection_lost(&shared, &err);
            if !options.auto_reconnect() {
                break;
            }
            bounded_sleep(&shared, options.connect_retry_interval()).await;
            continue;
        }

        // Main event loop of this transport incarnation. A stop request
        // keeps the loop polling while an LWT delivery wait is active, so
        // the confirmation can still arrive.
        let mut session_alive = true;
        while session_alive && (!shared.stopped() || lwt_wait_active(&shared)) {
            match eventloop.poll().await {
                Ok(event) => {
                    if let Err(err) = handle_event(&shared, &client, event) {
                        log::warn!(
                            "Force-disconnecting {}: {err}",
                            options.server_name()
                        );
                        let _ = client.disconnect().await;
                        mark_connection_lost(&shared, &err);
                        session_alive = false;
                    }
                }
                Err(err) => {
                    let err: Error = err.into();
                    if !shared.stopped() {
                        mark_connection_lost(&shared, &err);
                    }
                    session_alive = false;
                }
            }
        }

        if shared.stopped() || !options.auto_reconnect() {
            break;
        }
        bounded_sleep(&shared, options.connect_retry_interval()).await;
    }

    // Natural exit (no auto-reconnect): release resources. A
    // disconnect()-initiated exit does its own cleanup.
    if !shared.stopped() {
        let mut core = shared.lock();
        core.client = None;
        core.connected = false;
        core.status = ClientStatus::Idle;
        if let Some(monitor) = core.monitor.take() {
            monitor.abort();
        }
        drop(core);
        shared.callback.shutdown(shared.options.server_name());
    }
}

async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), Error> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ConnAck { code, .. }))) => {
                return if code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(Error::from_string(
                        ErrorKind::NotAuthorized,
                        format!("Broker refused connection: {code:?}"),
                    ))
                };
            }
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }
    }
}

/// Entered Connected: renew timestamps, start the monitor, replay the
/// subscription registry in one batch, then publish the BIRTH.
async fn on_connected(shared: &Arc<Shared>, client: &AsyncClient) -> Result<(), Error> {
    let options = &shared.options;
    log::info!(
        "Connected to {} as {}",
        options.server_url(),
        options.client_id()
    );

    let replayed = {
        let mut core = shared.lock();
        core.status = ClientStatus::Connected;
        core.connected = true;
        let now = SystemTime::now();
        core.connect_time = Some(now);
        core.online_date = Some(now);
        core.disconnect_time = None;
        if core.monitor.is_none() {
            core.monitor = Some(tokio::spawn(run_monitor(Arc::clone(shared))));
        }
        let filters: Vec<(String, QoS)> = core
            .subscriptions
            .iter()
            .map(|(topic, qos)| (topic.clone(), *qos))
            .collect();
        if filters.is_empty() {
            0
        } else {
            let count = filters.len();
            core.sub_queue.push_back(PendingRequest {
                filters: filters.clone(),
                reply: None,
                replay: true,
            });
            let batch = filters
                .into_iter()
                .map(|(path, qos)| SubscribeFilter::new(path, qos));
            if let Err(err) = client.try_subscribe_many(batch) {
                core.sub_queue.pop_back();
                return Err(err.into());
            }
            count
        }
    };
    shared.stats.on_connected();
    if replayed > 0 {
        log::info!("Replayed {replayed} subscriptions in one batch");
    }

    if let Some(birth) = options.birth() {
        log::info!("Publishing BIRTH on {}", birth.topic);
        client
            .publish(
                &birth.topic,
                QoS::AtLeastOnce,
                birth.retain,
                birth.payload.clone(),
            )
            .await?;
    }

    shared.callback.connect_complete(
        options.server_name(),
        options.server_url(),
        options.client_id(),
    );
    Ok(())
}

/// True while `disconnect()` is waiting for the LWT ack.
fn lwt_wait_active(shared: &Shared) -> bool {
    let core = shared.lock();
    core.lwt.awaiting && !core.lwt.delivered
}

/// Record an unsolicited connection loss and notify the callback.
fn mark_connection_lost(shared: &Shared, reason: &Error) {
    let was_connected = {
        let mut core = shared.lock();
        let was_connected = core.connected;
        core.connected = false;
        if core.status == ClientStatus::Connected {
            core.status = ClientStatus::Connecting;
        }
        if was_connected {
            let now = SystemTime::now();
            core.disconnect_time = Some(now);
            core.offline_date = Some(now);
        }
        was_connected
    };
    if was_connected {
        shared.stats.on_disconnected();
        log::warn!(
            "Connection to {} lost: {reason}",
            shared.options.server_name()
        );
        shared
            .callback
            .connection_lost(shared.options.server_name(), reason);
    }
}

/// Dispatch one transport event. An error return force-disconnects the
/// session.
fn handle_event(shared: &Shared, _client: &AsyncClient, event: Event) -> Result<(), Error> {
    match event {
        Event::Incoming(Packet::Publish(publish)) => {
            shared.stats.on_message_arrived();
            shared.callback.message_arrived(
                shared.options.server_name(),
                shared.options.server_url(),
                shared.options.client_id(),
                &publish.topic,
                &publish.payload,
            );
        }
        Event::Incoming(Packet::SubAck(ack)) => {
            let pending = shared.lock().sub_inflight.remove(&ack.pkid);
            if let Some(pending) = pending {
                let result = check_grants(&pending.filters, &ack.return_codes);
                if pending.replay {
                    if let Err(err) = result {
                        return Err(err);
                    }
                } else if let Some(reply) = pending.reply {
                    let _ = reply.send(result);
                }
            }
        }
        Event::Incoming(Packet::UnsubAck(ack)) => {
            let pending = shared.lock().unsub_inflight.remove(&ack.pkid);
            if let Some(PendingRequest {
                reply: Some(reply), ..
            }) = pending
            {
                let _ = reply.send(Ok(()));
            }
        }
        Event::Incoming(Packet::PubAck(ack)) => {
            let mut core = shared.lock();
            if core.lwt.awaiting && core.lwt.pkid == Some(ack.pkid) {
                core.lwt.delivered = true;
            }
        }
        Event::Incoming(Packet::PubComp(comp)) => {
            let mut core = shared.lock();
            if core.lwt.awaiting && core.lwt.pkid == Some(comp.pkid) {
                core.lwt.delivered = true;
            }
        }
        Event::Outgoing(Outgoing::Subscribe(pkid)) => {
            let mut core = shared.lock();
            if let Some(pending) = core.sub_queue.pop_front() {
                core.sub_inflight.insert(pkid, pending);
            }
        }
        Event::Outgoing(Outgoing::Unsubscribe(pkid)) => {
            let mut core = shared.lock();
            if let Some(pending) = core.unsub_queue.pop_front() {
                core.unsub_inflight.insert(pkid, pending);
            }
        }
        Event::Outgoing(Outgoing::Publish(pkid)) => {
            let mut core = shared.lock();
            if core.lwt.awaiting && core.lwt.pkid.is_none() {
                let qos0 = shared
                    .options
                    .lwt()
                    .map_or(true, |lwt| lwt.qos == QoS::AtMostOnce);
                if qos0 {
                    core.lwt.delivered = true;
                } else {
                    core.lwt.pkid = Some(pkid);
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Granted QoS must equal the requested QoS, entry by entry.
fn check_grants(
    filters: &[(String, QoS)],
    return_codes: &[SubscribeReasonCode],
) -> Result<(), Error> {
    if filters.len() != return_codes.len() {
        return Err(Error::from_string(
            ErrorKind::NotAuthorized,
            format!(
                "Broker acked {} of {} subscriptions",
                return_codes.len(),
                filters.len()
            ),
        ));
    }
    for ((topic, requested), granted) in filters.iter().zip(return_codes) {
        match granted {
            SubscribeReasonCode::Success(qos) if qos == requested => {}
            other => {
                return Err(Error::from_string(
                    ErrorKind::NotAuthorized,
                    format!(
                        "Subscription {topic} requested {requested:?}, broker granted {other:?}"
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Watch for silent connection loss: five consecutive disconnected ticks
/// while the status still claims Connected.
async fn run_monitor(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(MONITOR_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut missed: u32 = 0;
    loop {
        interval.tick().await;
        if shared.stopped() {
            return;
        }
        let (status, connected) = {
            let core = shared.lock();
            (core.status, core.connected)
        };
        if status == ClientStatus::Connected && !connected {
            missed += 1;
            if missed >= MONITOR_MISSED_TICKS {
                missed = 0;
                mark_connection_lost(
                    &shared,
                    &Error::new(ErrorKind::NotConnected, "Connection monitor timeout"),
                );
            }
        } else {
            missed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::NullCallback;

    fn client() -> TahuClient {
        TahuClient::new(
            ConnectOptions::new("Mqtt Server One", "tcp://127.0.0.1:1883", "test-client"),
            Arc::new(NullCallback),
        )
    }

    #[test]
    fn test_grant_check() {
        let filters = vec![
            ("a/+".to_string(), QoS::AtLeastOnce),
            ("b/#".to_string(), QoS::ExactlyOnce),
        ];

        let granted = vec![
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
            SubscribeReasonCode::Success(QoS::ExactlyOnce),
        ];
        assert!(check_grants(&filters, &granted).is_ok());

        // Broker downgraded the second subscription.
        let downgraded = vec![
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
            SubscribeReasonCode::Success(QoS::AtMostOnce),
        ];
        let err = check_grants(&filters, &downgraded).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        let failed = vec![
            SubscribeReasonCode::Success(QoS::AtLeastOnce),
            SubscribeReasonCode::Failure,
        ];
        assert!(check_grants(&filters, &failed).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_offline_updates_registry() {
        let client = client();
        client.subscribe("spBv1.0/G/#", QoS::AtLeastOnce).await.unwrap();
        client.subscribe("STATE/host", QoS::AtMostOnce).await.unwrap();
        assert_eq!(
            client.subscriptions(),
            vec![
                ("STATE/host".to_string(), QoS::AtMostOnce),
                ("spBv1.0/G/#".to_string(), QoS::AtLeastOnce),
            ]
        );

        client.unsubscribe("STATE/host").await.unwrap();
        assert_eq!(client.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_offline_fails() {
        let client = client();
        let err = client
            .publish("spBv1.0/G/NDATA/E", vec![1, 2, 3], QoS::AtMostOnce, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let client = TahuClient::new(
            ConnectOptions::new("s", "ws://bad:1883", "c"),
            Arc::new(NullCallback),
        );
        let err = client.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(client.status(), ClientStatus::Idle);
    }

    #[test]
    fn test_initial_state() {
        let client = client();
        assert_eq!(client.status(), ClientStatus::Idle);
        assert!(!client.is_connected());
        assert_eq!(client.stats().connection_count(), 0);
    }
}
