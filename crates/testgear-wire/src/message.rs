//! Message types, header layout and decoded payload shapes.

use bytes::Bytes;

use crate::error::{Result, WireError};
use crate::value::{Kind, Value};

/// Sentinel byte every message header starts with.
pub const PREFIX: u8 = 0xBD;

/// Header: prefix (1) + id (4) + type (1) + payload length (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Longest capability name the 1-byte length field can carry.
pub const MAX_NAME_LEN: usize = u8::MAX as usize;

/// Longest string value the 1-byte length field can carry.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;

/// The closed set of message types, tagged in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    ListPlugins = 0,
    PluginLoad = 1,
    PluginUnload = 2,
    PluginListProperties = 3,
    GetChar = 4,
    SetChar = 5,
    GetShort = 6,
    SetShort = 7,
    GetInt = 8,
    SetInt = 9,
    GetLong = 10,
    SetLong = 11,
    GetFloat = 12,
    SetFloat = 13,
    GetDouble = 14,
    SetDouble = 15,
    GetString = 16,
    SetString = 17,
    GetData = 18,
    SetData = 19,
    Run = 20,
    Describe = 21,
    RspOk = 22,
    RspError = 23,
}

/// How a message type lays out its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    /// No payload.
    Empty,
    /// `[name_len:1][name]`.
    Name,
    /// `[name_len:1][name]` followed by a value of the given kind.
    NameValue(Kind),
    /// Raw response bytes.
    Data,
}

impl MessageType {
    /// Every message type, in tag order.
    pub const ALL: [MessageType; 24] = [
        MessageType::ListPlugins,
        MessageType::PluginLoad,
        MessageType::PluginUnload,
        MessageType::PluginListProperties,
        MessageType::GetChar,
        MessageType::SetChar,
        MessageType::GetShort,
        MessageType::SetShort,
        MessageType::GetInt,
        MessageType::SetInt,
        MessageType::GetLong,
        MessageType::SetLong,
        MessageType::GetFloat,
        MessageType::SetFloat,
        MessageType::GetDouble,
        MessageType::SetDouble,
        MessageType::GetString,
        MessageType::SetString,
        MessageType::GetData,
        MessageType::SetData,
        MessageType::Run,
        MessageType::Describe,
        MessageType::RspOk,
        MessageType::RspError,
    ];

    /// Wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ListPlugins => "LIST_PLUGINS",
            MessageType::PluginLoad => "PLUGIN_LOAD",
            MessageType::PluginUnload => "PLUGIN_UNLOAD",
            MessageType::PluginListProperties => "PLUGIN_LIST_PROPERTIES",
            MessageType::GetChar => "GET_CHAR",
            MessageType::SetChar => "SET_CHAR",
            MessageType::GetShort => "GET_SHORT",
            MessageType::SetShort => "SET_SHORT",
            MessageType::GetInt => "GET_INT",
            MessageType::SetInt => "SET_INT",
            MessageType::GetLong => "GET_LONG",
            MessageType::SetLong => "SET_LONG",
            MessageType::GetFloat => "GET_FLOAT",
            MessageType::SetFloat => "SET_FLOAT",
            MessageType::GetDouble => "GET_DOUBLE",
            MessageType::SetDouble => "SET_DOUBLE",
            MessageType::GetString => "GET_STRING",
            MessageType::SetString => "SET_STRING",
            MessageType::GetData => "GET_DATA",
            MessageType::SetData => "SET_DATA",
            MessageType::Run => "RUN",
            MessageType::Describe => "DESCRIBE",
            MessageType::RspOk => "RSP_OK",
            MessageType::RspError => "RSP_ERROR",
        }
    }

    /// The getter type for a variable kind.
    pub fn get_for(kind: Kind) -> Option<MessageType> {
        match kind {
            Kind::Char => Some(MessageType::GetChar),
            Kind::Short => Some(MessageType::GetShort),
            Kind::Int => Some(MessageType::GetInt),
            Kind::Long => Some(MessageType::GetLong),
            Kind::Float => Some(MessageType::GetFloat),
            Kind::Double => Some(MessageType::GetDouble),
            Kind::String => Some(MessageType::GetString),
            Kind::Data => Some(MessageType::GetData),
            Kind::Command => None,
        }
    }

    /// The setter type for a variable kind.
    pub fn set_for(kind: Kind) -> Option<MessageType> {
        match kind {
            Kind::Char => Some(MessageType::SetChar),
            Kind::Short => Some(MessageType::SetShort),
            Kind::Int => Some(MessageType::SetInt),
            Kind::Long => Some(MessageType::SetLong),
            Kind::Float => Some(MessageType::SetFloat),
            Kind::Double => Some(MessageType::SetDouble),
            Kind::String => Some(MessageType::SetString),
            Kind::Data => Some(MessageType::SetData),
            Kind::Command => None,
        }
    }

    /// Kind read by a GET_* type.
    pub fn get_kind(self) -> Option<Kind> {
        Kind::VARIABLES
            .into_iter()
            .find(|kind| MessageType::get_for(*kind) == Some(self))
    }

    /// Kind written by a SET_* type.
    pub fn set_kind(self) -> Option<Kind> {
        Kind::VARIABLES
            .into_iter()
            .find(|kind| MessageType::set_for(*kind) == Some(self))
    }

    pub fn is_response(self) -> bool {
        matches!(self, MessageType::RspOk | MessageType::RspError)
    }

    pub fn layout(self) -> PayloadLayout {
        match self {
            MessageType::ListPlugins => PayloadLayout::Empty,
            MessageType::RspOk | MessageType::RspError => PayloadLayout::Data,
            other => match other.set_kind() {
                Some(kind) => PayloadLayout::NameValue(kind),
                None => PayloadLayout::Name,
            },
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(tag: u8) -> Result<Self> {
        MessageType::ALL
            .get(tag as usize)
            .copied()
            .ok_or(WireError::UnknownType(tag))
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header fields as read off the wire, before any validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub prefix: u8,
    pub id: u32,
    pub type_tag: u8,
    pub payload_len: u32,
}

impl RawHeader {
    /// Extract header fields from exactly [`HEADER_SIZE`] bytes.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            prefix: bytes[0],
            id: u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]),
            type_tag: bytes[5],
            payload_len: u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        }
    }

    /// Check the prefix first, then the type tag.
    pub fn validate(&self) -> Result<Header> {
        if self.prefix != PREFIX {
            return Err(WireError::InvalidFraming { found: self.prefix });
        }
        let msg_type = MessageType::try_from(self.type_tag)?;
        Ok(Header {
            id: self.id,
            msg_type,
            payload_len: self.payload_len,
        })
    }

    /// Validate a header that must answer a request.
    ///
    /// Any type other than `RSP_OK`/`RSP_ERROR`, including tags outside the
    /// enumeration, is [`WireError::InvalidCorrelation`].
    pub fn validate_response(&self) -> Result<Header> {
        if self.prefix != PREFIX {
            return Err(WireError::InvalidFraming { found: self.prefix });
        }
        match MessageType::try_from(self.type_tag) {
            Ok(msg_type) if msg_type.is_response() => Ok(Header {
                id: self.id,
                msg_type,
                payload_len: self.payload_len,
            }),
            Ok(msg_type) => Err(WireError::InvalidCorrelation(format!(
                "expected RSP_OK or RSP_ERROR, got {msg_type}"
            ))),
            Err(_) => Err(WireError::InvalidCorrelation(format!(
                "expected RSP_OK or RSP_ERROR, got unknown type {}",
                self.type_tag
            ))),
        }
    }
}

/// A validated message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u32,
    pub msg_type: MessageType,
    pub payload_len: u32,
}

/// A complete framed message with its undecoded payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: Header,
    pub payload: Bytes,
}

impl Message {
    pub fn id(&self) -> u32 {
        self.header.id
    }

    pub fn msg_type(&self) -> MessageType {
        self.header.msg_type
    }
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Name(String),
    Assign { name: String, value: Value },
    Data(Bytes),
}

impl Payload {
    /// The capability or provider name carried, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Payload::Name(name) | Payload::Assign { name, .. } => Some(name),
            Payload::Empty | Payload::Data(_) => None,
        }
    }
}
