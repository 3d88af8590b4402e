//! Command and query gateway
//!
//! The single entry point an outer surface (HTTP API, CLI, another service)
//! uses to command actuators and read fleet state. Commands follow a strict
//! order: validate the device, attempt the publish, then persist the desired
//! state and audit record REGARDLESS of whether the publish went out --
//! reconciliation replays persisted state once the device is reachable
//! again, so a dropped publish is repaired, not retried here.

use crate::error::{BridgeError, BridgeResult};
use crate::health::HealthFlag;
use crate::protocol::{HardwareAddress, TopicSchema};
use crate::storage::{
    ActuatorEvent, ActuatorState, DeliveryStatus, Device, SensorReading, Store,
};
use crate::transport::CommandPublisher;
use chrono::Utc;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CommandGateway {
    store: Arc<dyn Store>,
    publisher: Arc<dyn CommandPublisher>,
    schema: TopicSchema,
    storage_health: Arc<HealthFlag>,
}

impl CommandGateway {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn CommandPublisher>,
        schema: TopicSchema,
        storage_health: Arc<HealthFlag>,
    ) -> Self {
        Self {
            store,
            publisher,
            schema,
            storage_health,
        }
    }

    /// Issue a command to one actuator of a registered device.
    ///
    /// Returns the persisted desired state. `Err` means the device is
    /// unknown or persistence is down; a failed publish alone is NOT an
    /// error -- the state is recorded and reconciliation delivers it later.
    pub async fn issue_command(
        &self,
        addr: &HardwareAddress,
        kind: &str,
        command: &str,
    ) -> BridgeResult<ActuatorState> {
        let device = self.checked(self.store.device(addr).await)?;
        let Some(device) = device else {
            return Err(BridgeError::UnknownDevice(addr.clone()));
        };

        let value = command.trim().to_uppercase();
        let topic = self.schema.command_topic(addr, kind);
        let delivery = match self
            .publisher
            .publish(&topic, value.as_bytes(), QoS::AtLeastOnce, false)
            .await
        {
            Ok(()) => {
                debug!(device = %addr, kind, %value, "command published");
                DeliveryStatus::Sent
            }
            Err(e) => {
                warn!(
                    device = %addr,
                    kind,
                    error = %e,
                    "command publish failed, state recorded for reconciliation"
                );
                DeliveryStatus::Failed
            }
        };

        // Persist regardless of the publish outcome.
        let state = ActuatorState {
            addr: addr.clone(),
            kind: kind.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        };
        self.checked(self.store.upsert_actuator_state(state.clone()).await)?;

        let mut event = ActuatorEvent::sent(addr.clone(), kind, &value);
        event.status = delivery;
        self.checked(self.store.append_event(event).await)?;

        info!(
            device = %addr,
            device_name = %device.name,
            kind,
            %value,
            status = ?delivery,
            "command recorded"
        );
        Ok(state)
    }

    /// Record a device-side confirmation arriving on the status topic.
    ///
    /// Called from the dispatch loop, so failures are absorbed into the
    /// storage health flag instead of propagating.
    pub async fn confirm_command(&self, addr: &HardwareAddress, kind: &str, value: &str) {
        let state = ActuatorState {
            addr: addr.clone(),
            kind: kind.to_string(),
            value: value.to_string(),
            updated_at: Utc::now(),
        };
        if let Err(e) = self.store.upsert_actuator_state(state).await {
            self.storage_health.degrade(&e.to_string());
            return;
        }
        match self.store.confirm_latest_event(addr, kind, value).await {
            Ok(()) => {
                self.storage_health.restore();
                debug!(device = %addr, kind, value, "actuator confirmation recorded");
            }
            Err(e) => self.storage_health.degrade(&e.to_string()),
        }
    }

    // Query surface.

    pub async fn devices(&self) -> BridgeResult<Vec<Device>> {
        self.checked(self.store.devices().await)
    }

    pub async fn enabled_devices(&self) -> BridgeResult<Vec<Device>> {
        self.checked(self.store.enabled_devices().await)
    }

    pub async fn device(&self, addr: &HardwareAddress) -> BridgeResult<Device> {
        self.checked(self.store.device(addr).await)?
            .ok_or_else(|| BridgeError::UnknownDevice(addr.clone()))
    }

    pub async fn set_device_enabled(
        &self,
        addr: &HardwareAddress,
        enabled: bool,
    ) -> BridgeResult<Device> {
        let updated = self.checked(self.store.set_device_enabled(addr, enabled).await)?;
        updated.ok_or_else(|| BridgeError::UnknownDevice(addr.clone()))
    }

    pub async fn actuator_states(
        &self,
        addr: &HardwareAddress,
    ) -> BridgeResult<Vec<ActuatorState>> {
        self.checked(self.store.actuator_states(addr).await)
    }

    pub async fn events(&self) -> BridgeResult<Vec<ActuatorEvent>> {
        self.checked(self.store.events().await)
    }

    pub async fn failed_events(&self) -> BridgeResult<Vec<ActuatorEvent>> {
        self.checked(self.store.failed_events().await)
    }

    pub async fn readings(&self, addr: &HardwareAddress) -> BridgeResult<Vec<SensorReading>> {
        self.checked(self.store.readings(addr).await)
    }

    pub fn is_connected(&self) -> bool {
        self.publisher.is_connected()
    }

    /// Fold a storage result into the health flag before handing it on.
    fn checked<T>(&self, result: Result<T, crate::storage::StoreError>) -> BridgeResult<T> {
        match result {
            Ok(value) => {
                self.storage_health.restore();
                Ok(value)
            }
            Err(e) => {
                self.storage_health.degrade(&e.to_string());
                Err(e.into())
            }
        }
    }
}
