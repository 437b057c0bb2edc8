//! Typed capability values.
//!
//! A [`Value`] holds exactly one of the scalar, string or opaque-bytes kinds a
//! capability variable can have. [`Kind`] names those kinds, plus `Command`
//! for zero-argument command entries, which carry no value.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// The kind of a capability entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Data,
    Command,
}

impl Kind {
    /// All variable kinds, in wire-enumeration order.
    pub const VARIABLES: [Kind; 8] = [
        Kind::Char,
        Kind::Short,
        Kind::Int,
        Kind::Long,
        Kind::Float,
        Kind::Double,
        Kind::String,
        Kind::Data,
    ];

    /// Lowercase name used in property listings.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Char => "char",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::String => "string",
            Kind::Data => "data",
            Kind::Command => "command",
        }
    }

    /// Fixed on-wire width of scalar kinds; `None` for variable-length kinds.
    pub fn width(self) -> Option<usize> {
        match self {
            Kind::Char => Some(1),
            Kind::Short => Some(2),
            Kind::Int | Kind::Float => Some(4),
            Kind::Long | Kind::Double => Some(8),
            Kind::String | Kind::Data | Kind::Command => None,
        }
    }

    /// Whether this kind names a variable (as opposed to a command).
    pub fn is_variable(self) -> bool {
        self != Kind::Command
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "char" => Ok(Kind::Char),
            "short" => Ok(Kind::Short),
            "int" => Ok(Kind::Int),
            "long" => Ok(Kind::Long),
            "float" => Ok(Kind::Float),
            "double" => Ok(Kind::Double),
            "string" => Ok(Kind::String),
            "data" => Ok(Kind::Data),
            "command" => Ok(Kind::Command),
            other => Err(format!("unknown kind '{other}'")),
        }
    }
}

/// A typed capability value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Char(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Data(Bytes),
}

impl Value {
    /// The kind tag of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Char(_) => Kind::Char,
            Value::Short(_) => Kind::Short,
            Value::Int(_) => Kind::Int,
            Value::Long(_) => Kind::Long,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
            Value::String(_) => Kind::String,
            Value::Data(_) => Kind::Data,
        }
    }

    /// The zero/empty value of a variable kind. `None` for `Command`.
    pub fn zero(kind: Kind) -> Option<Value> {
        match kind {
            Kind::Char => Some(Value::Char(0)),
            Kind::Short => Some(Value::Short(0)),
            Kind::Int => Some(Value::Int(0)),
            Kind::Long => Some(Value::Long(0)),
            Kind::Float => Some(Value::Float(0.0)),
            Kind::Double => Some(Value::Double(0.0)),
            Kind::String => Some(Value::String(String::new())),
            Kind::Data => Some(Value::Data(Bytes::new())),
            Kind::Command => None,
        }
    }

    /// Parse a textual literal into a value of `kind`.
    ///
    /// Unparsable numeric literals yield zero, like C's `atoi`/`strtof`.
    pub fn parse_lenient(kind: Kind, literal: &str) -> Option<Value> {
        let text = literal.trim();
        let value = match kind {
            Kind::Char => Value::Char(text.parse().unwrap_or_default()),
            Kind::Short => Value::Short(text.parse().unwrap_or_default()),
            Kind::Int => Value::Int(text.parse().unwrap_or_default()),
            Kind::Long => Value::Long(text.parse().unwrap_or_default()),
            Kind::Float => Value::Float(text.parse().unwrap_or_default()),
            Kind::Double => Value::Double(text.parse().unwrap_or_default()),
            Kind::String => Value::String(literal.to_string()),
            Kind::Data => Value::Data(Bytes::copy_from_slice(literal.as_bytes())),
            Kind::Command => return None,
        };
        Some(value)
    }

    /// Parse a literal strictly, for user input.
    pub fn parse(kind: Kind, literal: &str) -> std::result::Result<Value, String> {
        let bad = |err: &dyn fmt::Display| format!("invalid {kind} literal '{literal}': {err}");
        match kind {
            Kind::Char => literal.parse().map(Value::Char).map_err(|e| bad(&e)),
            Kind::Short => literal.parse().map(Value::Short).map_err(|e| bad(&e)),
            Kind::Int => literal.parse().map(Value::Int).map_err(|e| bad(&e)),
            Kind::Long => literal.parse().map(Value::Long).map_err(|e| bad(&e)),
            Kind::Float => literal.parse().map(Value::Float).map_err(|e| bad(&e)),
            Kind::Double => literal.parse().map(Value::Double).map_err(|e| bad(&e)),
            Kind::String => Ok(Value::String(literal.to_string())),
            Kind::Data => Ok(Value::Data(Bytes::copy_from_slice(literal.as_bytes()))),
            Kind::Command => Err("commands carry no value".to_string()),
        }
    }

    /// Append the raw (unprefixed) little-endian encoding of this value.
    pub fn put_raw(&self, dst: &mut BytesMut) {
        match self {
            Value::Char(v) => dst.put_i8(*v),
            Value::Short(v) => dst.put_i16_le(*v),
            Value::Int(v) => dst.put_i32_le(*v),
            Value::Long(v) => dst.put_i64_le(*v),
            Value::Float(v) => dst.put_f32_le(*v),
            Value::Double(v) => dst.put_f64_le(*v),
            Value::String(v) => dst.put_slice(v.as_bytes()),
            Value::Data(v) => dst.put_slice(v),
        }
    }

    /// The raw encoding as an owned buffer.
    pub fn to_raw(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.raw_len());
        self.put_raw(&mut buf);
        buf.freeze()
    }

    /// Length of the raw encoding in bytes.
    pub fn raw_len(&self) -> usize {
        match self {
            Value::String(v) => v.len(),
            Value::Data(v) => v.len(),
            other => other.kind().width().unwrap_or(0),
        }
    }

    /// Decode a raw value of `kind` occupying exactly `raw`.
    pub fn from_raw(kind: Kind, raw: &[u8]) -> Result<Value> {
        if let Some(width) = kind.width() {
            if raw.len() < width {
                return Err(WireError::Truncated {
                    needed: width,
                    remaining: raw.len(),
                });
            }
            if raw.len() > width {
                return Err(WireError::TrailingBytes(raw.len() - width));
            }
        }

        let value = match kind {
            Kind::Char => Value::Char(i8::from_le_bytes([raw[0]])),
            Kind::Short => Value::Short(i16::from_le_bytes([raw[0], raw[1]])),
            Kind::Int => Value::Int(i32::from_le_bytes(fixed(raw))),
            Kind::Long => Value::Long(i64::from_le_bytes(fixed(raw))),
            Kind::Float => Value::Float(f32::from_le_bytes(fixed(raw))),
            Kind::Double => Value::Double(f64::from_le_bytes(fixed(raw))),
            Kind::String => Value::String(
                std::str::from_utf8(raw)
                    .map_err(|_| WireError::InvalidUtf8("string value"))?
                    .to_string(),
            ),
            Kind::Data => Value::Data(Bytes::copy_from_slice(raw)),
            Kind::Command => return Err(WireError::TrailingBytes(raw.len())),
        };
        Ok(value)
    }
}

/// Copy a slice already checked to be exactly `N` bytes into an array.
fn fixed<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&raw[..N]);
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Char(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Data(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}
