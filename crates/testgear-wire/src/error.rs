use crate::value::Kind;

/// Errors that can occur while encoding, decoding or moving messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The header does not start with the sentinel prefix byte.
    #[error("invalid framing (expected prefix 0xBD, found {found:#04x})")]
    InvalidFraming { found: u8 },

    /// The header carries a type tag outside the known enumeration.
    #[error("unknown message type {0}")]
    UnknownType(u8),

    /// A response does not answer the request that was sent.
    #[error("invalid correlation: {0}")]
    InvalidCorrelation(String),

    /// A capability name does not fit the 1-byte length field.
    #[error("name too long ({len} bytes, max {max})")]
    NameTooLong { len: usize, max: usize },

    /// A string value does not fit the 1-byte length field.
    #[error("string value too long ({len} bytes, max {max})")]
    ValueTooLong { len: usize, max: usize },

    /// The message type requires a name and none was given.
    #[error("{0} requires a name")]
    MissingName(&'static str),

    /// The message type requires a value and none was given.
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    /// The value kind does not match the message type.
    #[error("{msg_type} carries {expected} values, got {found}")]
    ValueKindMismatch {
        msg_type: &'static str,
        expected: Kind,
        found: Kind,
    },

    /// Fewer bytes remain than the payload layout needs.
    #[error("payload truncated (needed {needed} bytes, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// Bytes remain after the payload layout has been fully read.
    #[error("{0} unexpected trailing payload bytes")]
    TrailingBytes(usize),

    /// A name or string field is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing messages.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream before a complete message was transferred.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The stream ended part way through a header or payload.
    #[error("connection closed by peer mid-message ({received} of {expected} bytes)")]
    UnexpectedEof { received: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;
