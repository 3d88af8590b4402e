//! Device liveness tracking
//!
//! Three inputs decide whether a device is online:
//! - heartbeats carrying the device's network address mark it online;
//! - the broker-delivered last-will marker marks it offline immediately;
//! - a periodic sweep marks any online device offline once it has been
//!   silent longer than the configured threshold.
//!
//! The tracker also owns the offline -> online edge: the transition (and
//! the first heartbeat after a broker session is re-established) triggers
//! actuator reconciliation for that device.

use crate::config::LivenessSection;
use crate::health::HealthFlag;
use crate::protocol::{HardwareAddress, HeartbeatPayload};
use crate::reconcile::Reconciler;
use crate::storage::{Device, Store, StoreError};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct LivenessTracker {
    store: Arc<dyn Store>,
    reconciler: Arc<Reconciler>,
    storage_health: Arc<HealthFlag>,
    config: LivenessSection,
    /// Devices whose next heartbeat must trigger reconciliation even without
    /// an offline -> online edge. Filled when the broker session is
    /// re-established, because commands published while the session was down
    /// were dropped.
    pending_reconcile: Mutex<HashSet<HardwareAddress>>,
}

impl LivenessTracker {
    pub fn new(
        store: Arc<dyn Store>,
        reconciler: Arc<Reconciler>,
        storage_health: Arc<HealthFlag>,
        config: LivenessSection,
    ) -> Self {
        Self {
            store,
            reconciler,
            storage_health,
            config,
            pending_reconcile: Mutex::new(HashSet::new()),
        }
    }

    /// Handle one heartbeat (or last-will marker) for a device.
    pub async fn on_heartbeat(&self, addr: &HardwareAddress, payload: &HeartbeatPayload) {
        let device = match self.store.device(addr).await {
            Ok(device) => device,
            Err(e) => {
                self.storage_health.degrade(&e.to_string());
                return;
            }
        };

        match (device, payload) {
            (None, HeartbeatPayload::Online { network_addr }) if self.config.auto_register => {
                let mut device = Device::new(addr.clone(), addr.to_string());
                device.mark_online(network_addr, Utc::now());
                match self.store.upsert_device(device).await {
                    Ok(()) => {
                        self.storage_health.restore();
                        info!(device = %addr, network_addr = %network_addr, "registered new device from heartbeat");
                    }
                    Err(e) => self.storage_health.degrade(&e.to_string()),
                }
            }
            (None, _) => {
                // Unregistered devices heartbeat continuously; keep this
                // below warn to avoid a line every few seconds.
                debug!(device = %addr, "heartbeat from unknown device ignored");
            }
            (Some(mut device), HeartbeatPayload::Offline) => {
                if device.is_online() {
                    info!(device = %addr, "device reported offline via last will");
                }
                device.mark_offline();
                match self.store.upsert_device(device).await {
                    Ok(()) => self.storage_health.restore(),
                    Err(e) => self.storage_health.degrade(&e.to_string()),
                }
            }
            (Some(mut device), HeartbeatPayload::Online { network_addr }) => {
                let was_offline = !device.is_online();
                device.mark_online(network_addr, Utc::now());
                match self.store.upsert_device(device).await {
                    Ok(()) => self.storage_health.restore(),
                    Err(e) => {
                        self.storage_health.degrade(&e.to_string());
                        return;
                    }
                }

                let rearmed = self
                    .pending_reconcile
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(addr);
                if was_offline || rearmed {
                    info!(device = %addr, network_addr = %network_addr, "device online, reconciling actuators");
                    self.reconciler.reconcile(addr).await;
                }
            }
        }
    }

    /// Mark every known device for reconciliation on its next heartbeat.
    /// Called when the broker session is (re-)established.
    pub async fn rearm(&self) {
        let devices = match self.store.devices().await {
            Ok(devices) => {
                self.storage_health.restore();
                devices
            }
            Err(e) => {
                self.storage_health.degrade(&e.to_string());
                return;
            }
        };
        let mut pending = self.pending_reconcile.lock().expect("pending lock poisoned");
        pending.clear();
        pending.extend(devices.into_iter().map(|d| d.addr));
        debug!(devices = pending.len(), "armed reconciliation for next heartbeats");
    }

    /// One pass of the inactivity sweep: every online device silent for
    /// longer than the threshold is marked offline. Per-device failures are
    /// isolated; the sweep always finishes.
    pub async fn sweep_inactive(&self) {
        let devices = match self.store.devices().await {
            Ok(devices) => devices,
            Err(e) => {
                self.storage_health.degrade(&e.to_string());
                return;
            }
        };

        let now = Utc::now();
        let threshold = ChronoDuration::seconds(self.config.offline_threshold_secs as i64);
        let mut transitioned = 0usize;
        let mut write_failure: Option<StoreError> = None;

        for mut device in devices {
            if !device.is_online() {
                continue;
            }
            let stale = match device.last_contact {
                Some(last) => now - last > threshold,
                // Online without any recorded contact counts as stale.
                None => true,
            };
            if !stale {
                continue;
            }

            let addr = device.addr.clone();
            let last_contact = device.last_contact;
            device.mark_offline();
            // Announce only after the write lands: a device whose write
            // keeps failing stays online in the store and would otherwise
            // repeat this line on every tick.
            match self.store.upsert_device(device).await {
                Ok(()) => {
                    transitioned += 1;
                    warn!(
                        device = %addr,
                        last_contact = ?last_contact,
                        "marked device offline after missed heartbeats"
                    );
                }
                Err(e) => {
                    // Keep sweeping the remaining devices.
                    write_failure = Some(e);
                }
            }
        }

        // Settle the flag once per tick, so a persistently failing row
        // degrades on its first tick and stays silent afterwards.
        match write_failure {
            Some(e) => self.storage_health.degrade(&e.to_string()),
            None => self.storage_health.restore(),
        }

        if transitioned > 0 {
            debug!(transitioned, "liveness sweep complete");
        }
    }

    /// Spawn the periodic sweep task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick =
                tokio::time::interval(Duration::from_secs(tracker.config.sweep_interval_secs));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                tracker.sweep_inactive().await;
            }
        })
    }
}
