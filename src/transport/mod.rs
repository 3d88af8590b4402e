//! Outbound transport seam
//!
//! Core services (gateway, reconciliation) publish through this trait rather
//! than holding the MQTT client directly, so they can be exercised against a
//! mock without a broker.

pub mod mqtt;

use async_trait::async_trait;
use mqtt::MqttError;
use rumqttc::v5::mqttbytes::QoS;

/// Best-effort publisher backed by the broker session.
///
/// The production implementation ([`mqtt::ConnectionManager`]) silently
/// drops messages while disconnected and records a diagnostic; an `Err`
/// therefore only means the send failed on a live session. Callers absorb
/// errors and carry on, relying on reconciliation to repair device state.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), MqttError>;

    fn is_connected(&self) -> bool;
}
