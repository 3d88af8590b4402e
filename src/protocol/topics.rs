//! Topic schema: declarative classification of inbound topics
//!
//! The wire schema is a fixed table of segment patterns under a configurable
//! namespace. Classification walks the table instead of slicing topic strings
//! at hard-coded indexes, so the full schema is visible in one place:
//!
//! | pattern                               | kind                    |
//! |---------------------------------------|-------------------------|
//! | `<ns>/sensors/<addr>/<kind>`          | sensor sample           |
//! | `<ns>/actuators/<addr>/<kind>/status` | actuator confirmation   |
//! | `<ns>/heartbeat/<addr>`               | heartbeat / last-will   |
//! | `<ns>/device/status`                  | device status broadcast |
//!
//! Outbound commands go to `<ns>/actuators/<addr>/<kind>`.

use crate::protocol::address::HardwareAddress;
use crate::protocol::messages::{HeartbeatPayload, InboundMessage};
use thiserror::Error;

/// One topic segment in a pattern.
#[derive(Debug, Clone, Copy)]
enum Segment {
    /// Must match this literal exactly.
    Literal(&'static str),
    /// Captures the device hardware address; must pass address validation.
    Addr,
    /// Captures a free-form sub-kind token (sensor or actuator type).
    Kind,
}

/// Message families the schema can produce.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Family {
    Sensor,
    ActuatorConfirm,
    Heartbeat,
    StatusBroadcast,
}

struct Pattern {
    family: Family,
    segments: &'static [Segment],
}

use Segment::{Addr, Kind, Literal};

const SCHEMA: &[Pattern] = &[
    Pattern {
        family: Family::Sensor,
        segments: &[Literal("sensors"), Addr, Kind],
    },
    Pattern {
        family: Family::ActuatorConfirm,
        segments: &[Literal("actuators"), Addr, Kind, Literal("status")],
    },
    Pattern {
        family: Family::Heartbeat,
        segments: &[Literal("heartbeat"), Addr],
    },
    Pattern {
        family: Family::StatusBroadcast,
        segments: &[Literal("device"), Literal("status")],
    },
];

/// Classification failures. All of these mean "drop with a diagnostic";
/// none of them may propagate past the dispatch loop.
#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("unrecognized topic: {0}")]
    UnrecognizedTopic(String),
    #[error("invalid hardware address in topic {topic}: {segment:?}")]
    BadAddress { topic: String, segment: String },
    #[error("non-numeric sensor payload {payload:?} on topic {topic}")]
    NonNumericPayload { topic: String, payload: String },
    #[error("payload on topic {0} is not valid UTF-8")]
    BadPayloadEncoding(String),
}

/// Topic classifier and builder bound to one namespace.
#[derive(Debug, Clone)]
pub struct TopicSchema {
    namespace: String,
}

impl TopicSchema {
    /// Bind the schema to a namespace. The namespace is the first topic
    /// segment on every inbound and outbound topic (e.g. `damiot`).
    pub fn new(namespace: &str) -> Self {
        debug_assert!(
            !namespace.is_empty() && !namespace.contains('/'),
            "namespace must be a single topic segment"
        );
        Self {
            namespace: namespace.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Classify an inbound `(topic, payload)` pair into a semantic message.
    ///
    /// Purely syntactic: no persistence lookups happen here. Address
    /// validation and numeric payload parsing are the only payload checks.
    pub fn classify(&self, topic: &str, payload: &[u8]) -> Result<InboundMessage, RouteError> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.first() != Some(&self.namespace.as_str()) {
            return Err(RouteError::UnrecognizedTopic(topic.to_string()));
        }
        let tail = &segments[1..];

        for pattern in SCHEMA {
            match match_pattern(pattern.segments, tail, topic)? {
                Some(capture) => return self.build(pattern.family, capture, topic, payload),
                None => continue,
            }
        }
        Err(RouteError::UnrecognizedTopic(topic.to_string()))
    }

    fn build(
        &self,
        family: Family,
        capture: Capture,
        topic: &str,
        payload: &[u8],
    ) -> Result<InboundMessage, RouteError> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| RouteError::BadPayloadEncoding(topic.to_string()))?
            .trim();

        match family {
            Family::Sensor => {
                let value: f64 = text.parse().map_err(|_| RouteError::NonNumericPayload {
                    topic: topic.to_string(),
                    payload: text.to_string(),
                })?;
                Ok(InboundMessage::SensorSample {
                    addr: capture.addr.expect("sensor pattern captures an address"),
                    kind: capture.kind.expect("sensor pattern captures a kind"),
                    value,
                })
            }
            Family::ActuatorConfirm => Ok(InboundMessage::ActuatorConfirm {
                addr: capture.addr.expect("confirm pattern captures an address"),
                kind: capture.kind.expect("confirm pattern captures a kind"),
                value: text.to_uppercase(),
            }),
            Family::Heartbeat => Ok(InboundMessage::Heartbeat {
                addr: capture.addr.expect("heartbeat pattern captures an address"),
                payload: HeartbeatPayload::decode(text),
            }),
            Family::StatusBroadcast => Ok(InboundMessage::DeviceStatusBroadcast {
                value: text.to_uppercase(),
            }),
        }
    }

    /// Outbound command topic for one actuator: `<ns>/actuators/<addr>/<kind>`.
    pub fn command_topic(&self, addr: &HardwareAddress, kind: &str) -> String {
        format!("{}/actuators/{}/{}", self.namespace, addr, kind)
    }

    /// Default broker subscriptions covering every inbound pattern.
    pub fn default_subscriptions(&self) -> Vec<String> {
        vec![
            format!("{}/sensors/#", self.namespace),
            format!("{}/actuators/#", self.namespace),
            format!("{}/heartbeat/#", self.namespace),
            format!("{}/device/status", self.namespace),
        ]
    }
}

struct Capture {
    addr: Option<HardwareAddress>,
    kind: Option<String>,
}

/// Match topic segments against one pattern. Returns `Ok(None)` when the
/// shape doesn't fit (try the next pattern), `Err` when the shape fits but
/// the address segment fails validation.
fn match_pattern(
    pattern: &[Segment],
    tail: &[&str],
    topic: &str,
) -> Result<Option<Capture>, RouteError> {
    if pattern.len() != tail.len() {
        return Ok(None);
    }

    let mut capture = Capture {
        addr: None,
        kind: None,
    };
    for (segment, value) in pattern.iter().zip(tail) {
        match segment {
            Segment::Literal(lit) => {
                if value != lit {
                    return Ok(None);
                }
            }
            Segment::Addr => match HardwareAddress::parse(value) {
                Ok(addr) => capture.addr = Some(addr),
                Err(_) => {
                    return Err(RouteError::BadAddress {
                        topic: topic.to_string(),
                        segment: (*value).to_string(),
                    })
                }
            },
            Segment::Kind => {
                if value.is_empty() {
                    return Ok(None);
                }
                capture.kind = Some((*value).to_string());
            }
        }
    }
    Ok(Some(capture))
}
