//! Persisted record types owned by the core
//!
//! These mirror what the persistence collaborator stores: one `Device` row
//! per hardware address, one `ActuatorState` row per (device, actuator kind),
//! append-only `ActuatorEvent` and `SensorReading` logs.

use crate::protocol::HardwareAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Device lifecycle status derived from heartbeats and the liveness sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// One remote device, keyed by hardware address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub addr: HardwareAddress,
    pub name: String,
    /// Last network address carried by a heartbeat.
    pub network_addr: Option<String>,
    pub status: DeviceStatus,
    pub enabled: bool,
    /// Timestamp of the most recent heartbeat or connection event.
    pub last_contact: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(addr: HardwareAddress, name: impl Into<String>) -> Self {
        Self {
            addr,
            name: name.into(),
            network_addr: None,
            status: DeviceStatus::Offline,
            enabled: true,
            last_contact: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }

    pub fn mark_online(&mut self, network_addr: &str, now: DateTime<Utc>) {
        self.status = DeviceStatus::Online;
        self.network_addr = Some(network_addr.to_string());
        self.last_contact = Some(now);
    }

    pub fn mark_offline(&mut self) {
        self.status = DeviceStatus::Offline;
    }
}

/// Last commanded or confirmed value of one actuator. Last write wins,
/// whichever side (backend command or device confirmation) arrived last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorState {
    pub addr: HardwareAddress,
    pub kind: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Delivery status of a command event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Sent,
    Confirmed,
    Failed,
}

/// Append-only audit record of one issued command. Never mutated except to
/// attach a later device confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorEvent {
    pub id: Uuid,
    pub addr: HardwareAddress,
    pub kind: String,
    pub command: String,
    pub status: DeliveryStatus,
    /// Device-returned response text, set on confirmation.
    pub response: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ActuatorEvent {
    /// New audit record for a just-issued command.
    pub fn sent(addr: HardwareAddress, kind: &str, command: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            kind: kind.to_string(),
            command: command.to_string(),
            status: DeliveryStatus::Sent,
            response: None,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub addr: HardwareAddress,
    pub kind: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}
