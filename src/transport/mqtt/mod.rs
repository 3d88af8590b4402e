//! MQTT transport: broker session ownership, supervision, and publishing.

pub mod connection;
pub mod manager;

pub use connection::{configure_mqtt_options, ConnectionState, MqttError};
pub use manager::{BrokerEvent, ConnectionManager, DiagnosticInfo};
