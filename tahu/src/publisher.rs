// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Periodic DDATA publication on the edge side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codec::DeviceDescriptor;
use tokio::task::JoinHandle;

use crate::callback::{DataSimulator, DeviceDataSink};

/// Publishes one DDATA payload per registered device every period,
/// sourced from the [`DataSimulator`] collaborator.
pub struct PeriodicPublisher {
    period: Duration,
    devices: Vec<DeviceDescriptor>,
    simulator: Arc<dyn DataSimulator>,
    sink: Arc<dyn DeviceDataSink>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PeriodicPublisher {
    #[must_use]
    pub fn new(
        period: Duration,
        devices: Vec<DeviceDescriptor>,
        simulator: Arc<dyn DataSimulator>,
        sink: Arc<dyn DeviceDataSink>,
    ) -> Self {
        Self {
            period,
            devices,
            simulator,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Start the publish loop. No-op if already running.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);

        let period = self.period;
        let devices = self.devices.clone();
        let simulator = Arc::clone(&self.simulator);
        let sink = Arc::clone(&self.sink);
        let stop = Arc::clone(&self.stop);

        self.worker = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the first
            // publish happens one period after start.
            timer.tick().await;
            loop {
                timer.tick().await;
                if stop.load(Ordering::SeqCst) {
                    return;
                }
                for device in &devices {
                    let payload = simulator.device_payload(device);
                    if let Err(err) = sink.publish_device_data(device, &payload) {
                        log::warn!("Failed to publish DDATA for {device}: {err}");
                    }
                }
            }
        }));
    }

    /// Request a cooperative stop and wait for the loop to exit.
    pub async fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for PeriodicPublisher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
