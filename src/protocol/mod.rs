//! Wire-level protocol: addresses, topic schema, and message kinds.

pub mod address;
pub mod messages;
pub mod topics;

pub use address::{AddressError, HardwareAddress};
pub use messages::{unit_for_kind, HeartbeatPayload, InboundMessage, OFFLINE_MARKER};
pub use topics::{RouteError, TopicSchema};
