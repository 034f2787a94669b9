//! Attribute value wire encoding
//!
//! Scalars travel in network byte order at fixed width; text travels as raw
//! UTF-8. Timed bindings wrap the scalar in an envelope carrying the
//! federation timestamp, a microstep tie-breaker, and the sender's local
//! timestamp. Every decode dispatches on a tagged [`DataType`], so adding a
//! type is a compile error until every match arm handles it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::time::{LogicalTime, TimeError};

/// Errors raised by the codecs
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Buffer too short: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("{trailing} trailing bytes after {data_type} payload")]
    TrailingBytes { data_type: DataType, trailing: usize },

    #[error("Invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    #[error("Text payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Unknown data type tag {0:#04x}")]
    UnknownTypeTag(u8),

    #[error("Unknown data type name: {0}")]
    UnknownTypeName(String),

    #[error("Bad envelope timestamp: {0}")]
    BadTimestamp(#[from] TimeError),
}

/// The scalar types a binding can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Byte,
    Double,
    Float,
    Int,
    Long,
    Short,
    Text,
}

impl DataType {
    /// Wire tag used in the timed envelope
    pub fn tag(self) -> u8 {
        match self {
            DataType::Boolean => 0,
            DataType::Byte => 1,
            DataType::Double => 2,
            DataType::Float => 3,
            DataType::Int => 4,
            DataType::Long => 5,
            DataType::Short => 6,
            DataType::Text => 7,
        }
    }

    /// Inverse of [`DataType::tag`]
    pub fn from_tag(tag: u8) -> Result<Self, WireError> {
        match tag {
            0 => Ok(DataType::Boolean),
            1 => Ok(DataType::Byte),
            2 => Ok(DataType::Double),
            3 => Ok(DataType::Float),
            4 => Ok(DataType::Int),
            5 => Ok(DataType::Long),
            6 => Ok(DataType::Short),
            7 => Ok(DataType::Text),
            other => Err(WireError::UnknownTypeTag(other)),
        }
    }

    /// Encoded payload width in bytes, `None` for variable-length text
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Boolean | DataType::Byte => Some(1),
            DataType::Short => Some(2),
            DataType::Float | DataType::Int => Some(4),
            DataType::Double | DataType::Long => Some(8),
            DataType::Text => None,
        }
    }
}

impl FromStr for DataType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "byte" => Ok(DataType::Byte),
            "double" => Ok(DataType::Double),
            "float" => Ok(DataType::Float),
            "int" | "integer" => Ok(DataType::Int),
            "long" => Ok(DataType::Long),
            "short" => Ok(DataType::Short),
            "text" | "string" => Ok(DataType::Text),
            _ => Err(WireError::UnknownTypeName(s.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "boolean",
            DataType::Byte => "byte",
            DataType::Double => "double",
            DataType::Float => "float",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Short => "short",
            DataType::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// Copy an exact-width slice into an array
///
/// Callers check the width first; a mismatch is a codec bug, not bad input.
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(bytes);
    buf
}

/// A decoded attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttrValue {
    Boolean(bool),
    Byte(u8),
    Double(f64),
    Float(f32),
    Int(i32),
    Long(i64),
    Short(i16),
    Text(String),
}

impl AttrValue {
    /// The data type this value encodes as
    pub fn data_type(&self) -> DataType {
        match self {
            AttrValue::Boolean(_) => DataType::Boolean,
            AttrValue::Byte(_) => DataType::Byte,
            AttrValue::Double(_) => DataType::Double,
            AttrValue::Float(_) => DataType::Float,
            AttrValue::Int(_) => DataType::Int,
            AttrValue::Long(_) => DataType::Long,
            AttrValue::Short(_) => DataType::Short,
            AttrValue::Text(_) => DataType::Text,
        }
    }

    /// Encode in network byte order
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AttrValue::Boolean(v) => vec![u8::from(*v)],
            AttrValue::Byte(v) => vec![*v],
            AttrValue::Double(v) => v.to_be_bytes().to_vec(),
            AttrValue::Float(v) => v.to_be_bytes().to_vec(),
            AttrValue::Int(v) => v.to_be_bytes().to_vec(),
            AttrValue::Long(v) => v.to_be_bytes().to_vec(),
            AttrValue::Short(v) => v.to_be_bytes().to_vec(),
            AttrValue::Text(s) => s.as_bytes().to_vec(),
        }
    }

    /// Decode a whole buffer as `data_type`
    ///
    /// Fixed-width types reject both short and oversize buffers; text
    /// consumes everything.
    pub fn decode(data_type: DataType, bytes: &[u8]) -> Result<Self, WireError> {
        if let Some(width) = data_type.fixed_width() {
            if bytes.len() < width {
                return Err(WireError::Truncated {
                    expected: width,
                    got: bytes.len(),
                });
            }
            if bytes.len() > width {
                return Err(WireError::TrailingBytes {
                    data_type,
                    trailing: bytes.len() - width,
                });
            }
        }
        match data_type {
            DataType::Boolean => match bytes[0] {
                0 => Ok(AttrValue::Boolean(false)),
                1 => Ok(AttrValue::Boolean(true)),
                other => Err(WireError::InvalidBool(other)),
            },
            DataType::Byte => Ok(AttrValue::Byte(bytes[0])),
            DataType::Double => Ok(AttrValue::Double(f64::from_be_bytes(array(bytes)))),
            DataType::Float => Ok(AttrValue::Float(f32::from_be_bytes(array(bytes)))),
            DataType::Int => Ok(AttrValue::Int(i32::from_be_bytes(array(bytes)))),
            DataType::Long => Ok(AttrValue::Long(i64::from_be_bytes(array(bytes)))),
            DataType::Short => Ok(AttrValue::Short(i16::from_be_bytes(array(bytes)))),
            DataType::Text => Ok(AttrValue::Text(String::from_utf8(bytes.to_vec())?)),
        }
    }
}

/// Envelope around a timed network event
///
/// Wire layout, all fields big-endian:
/// `[f64 timestamp][u32 microstep][f64 source timestamp][u8 type tag][payload]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEnvelope {
    /// Federation time the event is scheduled for
    pub timestamp: LogicalTime,
    /// Tie-break ordinal among events sharing a timestamp
    pub microstep: u32,
    /// Sender's local time when the event was produced
    #[serde(rename = "source-timestamp")]
    pub source_timestamp: LogicalTime,
    /// The value itself
    pub payload: AttrValue,
}

impl TimedEnvelope {
    /// Bytes before the payload begins
    pub const HEADER_LEN: usize = 8 + 4 + 8 + 1;

    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload.encode();
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + payload.len());
        buf.extend_from_slice(&self.timestamp.as_secs_f64().to_be_bytes());
        buf.extend_from_slice(&self.microstep.to_be_bytes());
        buf.extend_from_slice(&self.source_timestamp.as_secs_f64().to_be_bytes());
        buf.push(self.payload.data_type().tag());
        buf.extend_from_slice(&payload);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(WireError::Truncated {
                expected: Self::HEADER_LEN,
                got: bytes.len(),
            });
        }
        let timestamp = LogicalTime::new(f64::from_be_bytes(array(&bytes[0..8])))?;
        let microstep = u32::from_be_bytes(array(&bytes[8..12]));
        let source_timestamp = LogicalTime::new(f64::from_be_bytes(array(&bytes[12..20])))?;
        let data_type = DataType::from_tag(bytes[20])?;
        let payload = AttrValue::decode(data_type, &bytes[Self::HEADER_LEN..])?;
        Ok(Self {
            timestamp,
            microstep,
            source_timestamp,
            payload,
        })
    }
}
