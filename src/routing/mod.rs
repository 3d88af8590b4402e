//! Inbound message routing: broker events in, service calls out.

pub mod dispatcher;

pub use dispatcher::MessageDispatcher;
