//! Application-facing publish/subscribe traits
//!
//! A port describes one named attribute route. The session reads the
//! description once at registration; subscribers additionally receive
//! decoded values as logical time advances past them.

use rtilink::{AttrValue, DataType, LogicalTime, TimedEnvelope};

/// A decoded reflected value, with or without its wire envelope
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectedValue {
    Scalar(AttrValue),
    Timed(TimedEnvelope),
}

impl ReflectedValue {
    pub fn value(&self) -> &AttrValue {
        match self {
            ReflectedValue::Scalar(value) => value,
            ReflectedValue::Timed(envelope) => &envelope.payload,
        }
    }
}

/// A decoded update waiting for the logical clock to reach it
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// Binding the value arrived on
    pub binding: String,
    /// Logical time the value belongs to
    pub time: LogicalTime,
    pub value: ReflectedValue,
}

/// Declares an attribute this application sends
pub trait PublisherPort {
    /// Binding name, doubling as the RTI attribute name
    fn bound_name(&self) -> &str;

    fn data_type(&self) -> DataType;

    /// Object class the attribute belongs to
    fn class_name(&self) -> &str;

    /// Whether values travel inside a timed envelope
    fn timestamped(&self) -> bool {
        false
    }
}

/// Declares an attribute this application receives
pub trait SubscriberPort {
    fn bound_name(&self) -> &str;

    fn data_type(&self) -> DataType;

    fn class_name(&self) -> &str;

    fn timestamped(&self) -> bool {
        false
    }

    /// Called once per matured event, in timestamp order
    fn deliver(&mut self, event: PendingEvent);
}
