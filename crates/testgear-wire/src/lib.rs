//! Binary message framing and typed payload codec for the Test Gear protocol.
//!
//! Every message is framed with a fixed 10-byte header:
//! - a 1-byte sentinel prefix (`0xBD`)
//! - a 4-byte little-endian correlation id
//! - a 1-byte message type tag
//! - a 4-byte little-endian payload length
//!
//! followed by a payload whose layout is determined by the message type.
//! Requests carry a length-prefixed capability name and, for setters, a value;
//! responses carry raw result bytes or a human-readable error string.

pub mod buf;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod value;
pub mod writer;

pub use codec::{
    check_correlation, decode_header, decode_payload, decode_result, encode_response,
    MessageEncoder, WireConfig, DEFAULT_MAX_PAYLOAD,
};
pub use error::{Result, WireError};
pub use message::{
    Header, Message, MessageType, Payload, PayloadLayout, RawHeader, HEADER_SIZE, MAX_NAME_LEN,
    MAX_STRING_LEN, PREFIX,
};
pub use reader::MessageReader;
pub use value::{Kind, Value};
pub use writer::MessageWriter;
