//! Mock publisher and fault-injecting store
//!
//! [`MockPublisher`] stands in for the broker session and records every
//! publish; [`FlakyStore`] wraps [`MemoryStore`] with switchable failure
//! injection so degraded-mode paths can be exercised deterministically.

use crate::protocol::HardwareAddress;
use crate::storage::{
    ActuatorEvent, ActuatorState, Device, MemoryStore, SensorReading, Store, StoreError,
};
use crate::transport::mqtt::MqttError;
use crate::transport::CommandPublisher;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// In-memory [`CommandPublisher`] that records publishes.
///
/// Mirrors the production semantics: while "disconnected" publishes are
/// silently dropped (still `Ok`), and `fail_publishes` simulates a send
/// failure on a live session.
#[derive(Debug, Default)]
pub struct MockPublisher {
    published: Mutex<Vec<PublishedMessage>>,
    disconnected: AtomicBool,
    failing: AtomicBool,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().expect("publish log poisoned").clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandPublisher for MockPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MqttError::PublishFailed("injected failure".to_string()));
        }
        if self.disconnected.load(Ordering::SeqCst) {
            // Dropped, same as the real manager without a session.
            return Ok(());
        }
        self.published
            .lock()
            .expect("publish log poisoned")
            .push(PublishedMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
                qos,
                retain,
            });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }
}

/// [`MemoryStore`] wrapper with failure injection.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_all: AtomicBool,
    fail_writes_for: Mutex<HashSet<HardwareAddress>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until switched back off.
    pub fn fail_everything(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    /// Make device writes for one address fail while everything else works.
    pub fn fail_writes_for(&self, addr: HardwareAddress) {
        self.fail_writes_for
            .lock()
            .expect("failure set poisoned")
            .insert(addr);
    }

    /// Let device writes for one address succeed again.
    pub fn restore_writes_for(&self, addr: &HardwareAddress) {
        self.fail_writes_for
            .lock()
            .expect("failure set poisoned")
            .remove(addr);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_all.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn device(&self, addr: &HardwareAddress) -> Result<Option<Device>, StoreError> {
        self.check()?;
        self.inner.device(addr).await
    }

    async fn devices(&self) -> Result<Vec<Device>, StoreError> {
        self.check()?;
        self.inner.devices().await
    }

    async fn enabled_devices(&self) -> Result<Vec<Device>, StoreError> {
        self.check()?;
        self.inner.enabled_devices().await
    }

    async fn upsert_device(&self, device: Device) -> Result<(), StoreError> {
        self.check()?;
        let poisoned = self
            .fail_writes_for
            .lock()
            .expect("failure set poisoned")
            .contains(&device.addr);
        if poisoned {
            return Err(StoreError::Unavailable(format!(
                "injected write failure for {}",
                device.addr
            )));
        }
        self.inner.upsert_device(device).await
    }

    async fn set_device_enabled(
        &self,
        addr: &HardwareAddress,
        enabled: bool,
    ) -> Result<Option<Device>, StoreError> {
        self.check()?;
        self.inner.set_device_enabled(addr, enabled).await
    }

    async fn actuator_states(
        &self,
        addr: &HardwareAddress,
    ) -> Result<Vec<ActuatorState>, StoreError> {
        self.check()?;
        self.inner.actuator_states(addr).await
    }

    async fn upsert_actuator_state(&self, state: ActuatorState) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_actuator_state(state).await
    }

    async fn append_event(&self, event: ActuatorEvent) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append_event(event).await
    }

    async fn confirm_latest_event(
        &self,
        addr: &HardwareAddress,
        kind: &str,
        response: &str,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.inner.confirm_latest_event(addr, kind, response).await
    }

    async fn events(&self) -> Result<Vec<ActuatorEvent>, StoreError> {
        self.check()?;
        self.inner.events().await
    }

    async fn failed_events(&self) -> Result<Vec<ActuatorEvent>, StoreError> {
        self.check()?;
        self.inner.failed_events().await
    }

    async fn append_reading(&self, reading: SensorReading) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append_reading(reading).await
    }

    async fn readings(&self, addr: &HardwareAddress) -> Result<Vec<SensorReading>, StoreError> {
        self.check()?;
        self.inner.readings(addr).await
    }
}
