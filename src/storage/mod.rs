//! Persistence port consumed by the core
//!
//! The real backing store (SQL or otherwise) lives outside this crate; the
//! core only depends on this trait. [`MemoryStore`] is the bundled
//! implementation used for wiring and tests.
//!
//! Concurrency contract: upserts are per-key; concurrent writes to the same
//! (device, actuator) key serialize inside the implementation, last write
//! wins. Calls return within bounded time or fail with [`StoreError`].

pub mod memory;
pub mod records;

pub use memory::MemoryStore;
pub use records::{
    ActuatorEvent, ActuatorState, DeliveryStatus, Device, DeviceStatus, SensorReading,
};

use crate::protocol::HardwareAddress;
use async_trait::async_trait;
use thiserror::Error;

/// Persistence-layer failures. Always treated as recoverable: callers
/// degrade, they never abort.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    // Devices
    async fn device(&self, addr: &HardwareAddress) -> Result<Option<Device>, StoreError>;
    async fn devices(&self) -> Result<Vec<Device>, StoreError>;
    async fn enabled_devices(&self) -> Result<Vec<Device>, StoreError>;
    async fn upsert_device(&self, device: Device) -> Result<(), StoreError>;
    async fn set_device_enabled(
        &self,
        addr: &HardwareAddress,
        enabled: bool,
    ) -> Result<Option<Device>, StoreError>;

    // Actuator state (one row per device/kind, created lazily)
    async fn actuator_states(
        &self,
        addr: &HardwareAddress,
    ) -> Result<Vec<ActuatorState>, StoreError>;
    async fn upsert_actuator_state(&self, state: ActuatorState) -> Result<(), StoreError>;

    // Command audit log (append-only)
    async fn append_event(&self, event: ActuatorEvent) -> Result<(), StoreError>;
    /// Attach a device confirmation to the most recent `SENT` event for this
    /// (device, kind); no-op if none is pending.
    async fn confirm_latest_event(
        &self,
        addr: &HardwareAddress,
        kind: &str,
        response: &str,
    ) -> Result<(), StoreError>;
    /// All events, newest first.
    async fn events(&self) -> Result<Vec<ActuatorEvent>, StoreError>;
    async fn failed_events(&self) -> Result<Vec<ActuatorEvent>, StoreError>;

    // Telemetry (append-only)
    async fn append_reading(&self, reading: SensorReading) -> Result<(), StoreError>;
    async fn readings(&self, addr: &HardwareAddress) -> Result<Vec<SensorReading>, StoreError>;
}
