//! Semantic message kinds produced by the topic router
//!
//! The router reduces every inbound `(topic, payload)` pair to one of these
//! variants; everything downstream works in terms of them and never touches
//! raw topic strings again.

use crate::protocol::address::HardwareAddress;

/// Reserved heartbeat payload published by the broker on the device's behalf
/// (last-will) when its connection drops unexpectedly.
pub const OFFLINE_MARKER: &str = "offline";

/// A classified inbound broker message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Telemetry sample: numeric value for one sensor of one device.
    SensorSample {
        addr: HardwareAddress,
        kind: String,
        value: f64,
    },
    /// Device-side confirmation that an actuator reached a state.
    ActuatorConfirm {
        addr: HardwareAddress,
        kind: String,
        value: String,
    },
    /// Periodic liveness beacon, or the last-will offline marker.
    Heartbeat {
        addr: HardwareAddress,
        payload: HeartbeatPayload,
    },
    /// Fleet-wide informational broadcast; carries no device address.
    DeviceStatusBroadcast { value: String },
}

/// Decoded heartbeat payload.
#[derive(Debug, Clone, PartialEq)]
pub enum HeartbeatPayload {
    /// Normal heartbeat carrying the device's current network address.
    Online { network_addr: String },
    /// Last-will marker: the device dropped off the broker.
    Offline,
}

impl HeartbeatPayload {
    pub fn decode(payload: &str) -> Self {
        if payload.eq_ignore_ascii_case(OFFLINE_MARKER) {
            HeartbeatPayload::Offline
        } else {
            HeartbeatPayload::Online {
                network_addr: payload.to_string(),
            }
        }
    }
}

/// Measurement unit recorded alongside a sensor reading, derived from the
/// sensor kind the device reported in the topic.
pub fn unit_for_kind(kind: &str) -> &'static str {
    match kind.to_lowercase().as_str() {
        "temperatura" => "°C",
        "humedad" | "humedad_suelo" | "higrometro_suelo" | "higrómetro_suelo" => "%",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_marker_is_case_insensitive() {
        assert_eq!(HeartbeatPayload::decode("offline"), HeartbeatPayload::Offline);
        assert_eq!(HeartbeatPayload::decode("OFFLINE"), HeartbeatPayload::Offline);
        assert_eq!(HeartbeatPayload::decode("Offline"), HeartbeatPayload::Offline);
    }

    #[test]
    fn test_network_address_heartbeat() {
        assert_eq!(
            HeartbeatPayload::decode("192.168.8.130"),
            HeartbeatPayload::Online {
                network_addr: "192.168.8.130".to_string()
            }
        );
    }

    #[test]
    fn test_unit_mapping() {
        assert_eq!(unit_for_kind("temperatura"), "°C");
        assert_eq!(unit_for_kind("TEMPERATURA"), "°C");
        assert_eq!(unit_for_kind("humedad"), "%");
        assert_eq!(unit_for_kind("humedad_suelo"), "%");
        // Some firmware revisions publish the accented soil-hygrometer kind.
        assert_eq!(unit_for_kind("higrómetro_suelo"), "%");
        assert_eq!(unit_for_kind("HIGRÓMETRO_SUELO"), "%");
        assert_eq!(unit_for_kind("higrometro_suelo"), "%");
        assert_eq!(unit_for_kind("luz"), "");
    }
}
