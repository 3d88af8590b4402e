//! Error taxonomy for the messaging core
//!
//! Three failure families, none of them fatal:
//! - transport failures are absorbed by the connection manager and retried by
//!   its supervisory tick;
//! - malformed messages are dropped at the router with a diagnostic;
//! - persistence failures flip the storage health flag and the side effect is
//!   skipped.
//!
//! [`BridgeError`] is the boundary type handed to callers of the gateway's
//! command/query interface; nothing in this crate terminates the process.

use crate::config::ConfigError;
use crate::protocol::{HardwareAddress, RouteError};
use crate::storage::StoreError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("malformed message: {0}")]
    Malformed(#[from] RouteError),

    #[error("persistence unavailable: {0}")]
    Persistence(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("unknown device: {0}")]
    UnknownDevice(HardwareAddress),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
