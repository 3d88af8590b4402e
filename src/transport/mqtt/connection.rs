//! Connection state and MQTT option construction
//!
//! Pure pieces of the connection manager: the state machine values, the
//! transport error type, and the translation from config to `MqttOptions`.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Broker session state. `Disconnected -> Connecting -> Connected`, back to
/// `Disconnected` on any transport-level loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Transport-level errors. All recoverable: the supervisory tick retries,
/// nothing here reaches a caller of the command interface.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),
}

/// Build `MqttOptions` from the config section.
pub fn configure_mqtt_options(config: &MqttSection) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut options = MqttOptions::new(&config.client_id, host, port);

    if url.scheme() == "mqtts" {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = config.username() {
        options.set_credentials(&username, &config.password().unwrap_or_default());
    }

    options.set_keep_alive(Duration::from_secs(60));

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(broker_url: &str) -> MqttSection {
        MqttSection {
            broker_url: broker_url.to_string(),
            client_id: "test-backend".to_string(),
            namespace: "ns".to_string(),
            username_env: None,
            password_env: None,
            retry_interval_secs: 30,
            connect_timeout_secs: 10,
            subscriptions: Vec::new(),
        }
    }

    #[test]
    fn test_configure_options_plain() {
        let options = configure_mqtt_options(&section("mqtt://localhost:1883")).unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
    }

    #[test]
    fn test_configure_options_default_ports() {
        let plain = configure_mqtt_options(&section("mqtt://broker.local")).unwrap();
        assert_eq!(plain.broker_address().1, 1883);

        let tls = configure_mqtt_options(&section("mqtts://broker.local")).unwrap();
        assert_eq!(tls.broker_address().1, 8883);
    }

    #[test]
    fn test_invalid_broker_url() {
        let result = configure_mqtt_options(&section("not a url"));
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_connection_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnected).unwrap(),
            "\"disconnected\""
        );
    }
}
