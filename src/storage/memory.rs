//! In-memory store implementation
//!
//! Backs the persistence port with `RwLock`-guarded maps. Whole-map locks are
//! coarser than the per-row serialization a SQL backend would give, but they
//! satisfy the same contract: same-key writes serialize, last write wins.

use super::records::{
    ActuatorEvent, ActuatorState, DeliveryStatus, Device, SensorReading,
};
use super::{Store, StoreError};
use crate::protocol::HardwareAddress;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<HashMap<HardwareAddress, Device>>,
    actuators: RwLock<HashMap<(HardwareAddress, String), ActuatorState>>,
    events: RwLock<Vec<ActuatorEvent>>,
    readings: RwLock<Vec<SensorReading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn device(&self, addr: &HardwareAddress) -> Result<Option<Device>, StoreError> {
        Ok(self.devices.read().await.get(addr).cloned())
    }

    async fn devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.devices.read().await.values().cloned().collect())
    }

    async fn enabled_devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.enabled)
            .cloned()
            .collect())
    }

    async fn upsert_device(&self, device: Device) -> Result<(), StoreError> {
        let _ = self
            .devices
            .write()
            .await
            .insert(device.addr.clone(), device);
        Ok(())
    }

    async fn set_device_enabled(
        &self,
        addr: &HardwareAddress,
        enabled: bool,
    ) -> Result<Option<Device>, StoreError> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(addr).map(|device| {
            device.enabled = enabled;
            device.clone()
        }))
    }

    async fn actuator_states(
        &self,
        addr: &HardwareAddress,
    ) -> Result<Vec<ActuatorState>, StoreError> {
        let mut states: Vec<ActuatorState> = self
            .actuators
            .read()
            .await
            .values()
            .filter(|s| &s.addr == addr)
            .cloned()
            .collect();
        states.sort_by(|a, b| a.kind.cmp(&b.kind));
        Ok(states)
    }

    async fn upsert_actuator_state(&self, state: ActuatorState) -> Result<(), StoreError> {
        let key = (state.addr.clone(), state.kind.clone());
        let _ = self.actuators.write().await.insert(key, state);
        Ok(())
    }

    async fn append_event(&self, event: ActuatorEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn confirm_latest_event(
        &self,
        addr: &HardwareAddress,
        kind: &str,
        response: &str,
    ) -> Result<(), StoreError> {
        let mut events = self.events.write().await;
        if let Some(event) = events
            .iter_mut()
            .rev()
            .find(|e| &e.addr == addr && e.kind == kind && e.status == DeliveryStatus::Sent)
        {
            event.status = DeliveryStatus::Confirmed;
            event.response = Some(response.to_string());
        }
        Ok(())
    }

    async fn events(&self) -> Result<Vec<ActuatorEvent>, StoreError> {
        let mut events = self.events.read().await.clone();
        events.reverse();
        Ok(events)
    }

    async fn failed_events(&self) -> Result<Vec<ActuatorEvent>, StoreError> {
        let mut events: Vec<ActuatorEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.status == DeliveryStatus::Failed)
            .cloned()
            .collect();
        events.reverse();
        Ok(events)
    }

    async fn append_reading(&self, reading: SensorReading) -> Result<(), StoreError> {
        self.readings.write().await.push(reading);
        Ok(())
    }

    async fn readings(&self, addr: &HardwareAddress) -> Result<Vec<SensorReading>, StoreError> {
        Ok(self
            .readings
            .read()
            .await
            .iter()
            .filter(|r| &r.addr == addr)
            .cloned()
            .collect())
    }
}
