//! # fleetbridge
//!
//! Resilient MQTT backend core for a small fleet of embedded devices.
//!
//! The crate sits between an MQTT broker and a persistence backend and keeps
//! running through the failure of either:
//!
//! - **transport**: a supervised broker session that retries on a fixed tick
//!   and never takes the host process down ([`transport::mqtt`]);
//! - **routing**: a declarative topic schema that classifies inbound
//!   messages and drops malformed ones with a diagnostic ([`protocol`],
//!   [`routing`]);
//! - **liveness**: heartbeat and last-will handling plus a periodic sweep
//!   that marks silent devices offline ([`liveness`]);
//! - **reconciliation**: republishing persisted actuator state when a device
//!   comes back ([`reconcile`]);
//! - **gateway**: the command/query surface for an outer API, which persists
//!   desired state whether or not the publish went out ([`gateway`]).
//!
//! ## Example
//!
//! ```no_run
//! use fleetbridge::config::BridgeConfig;
//! use std::path::Path;
//!
//! let config = BridgeConfig::load_from_file(Path::new("fleetbridge.toml")).unwrap();
//! assert!(!config.mqtt.client_id.is_empty());
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod liveness;
pub mod observability;
pub mod protocol;
pub mod reconcile;
pub mod routing;
pub mod storage;
pub mod testing;
pub mod transport;

pub use config::BridgeConfig;
pub use error::{BridgeError, BridgeResult};
pub use gateway::CommandGateway;
pub use health::{Health, HealthFlag};
pub use liveness::LivenessTracker;
pub use protocol::{HardwareAddress, TopicSchema};
pub use reconcile::Reconciler;
pub use routing::MessageDispatcher;
pub use storage::{MemoryStore, Store};
pub use transport::mqtt::{BrokerEvent, ConnectionManager, ConnectionState};
pub use transport::CommandPublisher;
