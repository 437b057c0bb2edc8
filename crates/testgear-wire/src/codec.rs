use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::buf::{PayloadReader, PayloadWriter};
use crate::error::{Result, WireError};
use crate::message::{Header, MessageType, Payload, PayloadLayout, RawHeader, HEADER_SIZE, PREFIX};
use crate::value::{Kind, Value};

/// Default maximum payload size: 64 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// Configuration for message readers and writers.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Maximum payload size in bytes. Default: 64 KiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Builds outgoing messages and owns the sending side's id counter.
///
/// The counter advances exactly once per successfully encoded message;
/// an encode that fails leaves it untouched.
#[derive(Debug, Default)]
pub struct MessageEncoder {
    next_id: u32,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the counter at `first_id`.
    pub fn starting_at(first_id: u32) -> Self {
        Self { next_id: first_id }
    }

    /// The id the next successful encode will use.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Encode a message of `msg_type`, returning the wire bytes and the id used.
    ///
    /// Wire format:
    /// ```text
    /// ┌────────────┬──────────┬──────────┬──────────────┬──────────────────┐
    /// │ Prefix (1B)│ Id       │ Type (1B)│ Length       │ Payload          │
    /// │ 0xBD       │ (4B LE)  │          │ (4B LE)      │ (Length bytes)   │
    /// └────────────┴──────────┴──────────┴──────────────┴──────────────────┘
    /// ```
    pub fn encode(
        &mut self,
        msg_type: MessageType,
        name: Option<&str>,
        value: Option<&Value>,
    ) -> Result<(Bytes, u32)> {
        let payload = encode_payload(msg_type, name, value)?;
        let id = self.next_id;
        let bytes = frame(id, msg_type, &payload)?;
        self.next_id = self.next_id.wrapping_add(1);
        debug!(
            id,
            msg_type = msg_type.as_str(),
            payload_len = payload.len(),
            "encoded message"
        );
        Ok((bytes, id))
    }
}

fn encode_payload(msg_type: MessageType, name: Option<&str>, value: Option<&Value>) -> Result<Bytes> {
    let mut writer = PayloadWriter::new();
    match msg_type.layout() {
        PayloadLayout::Empty => {}
        PayloadLayout::Name => {
            let name = name.ok_or(WireError::MissingName(msg_type.as_str()))?;
            writer.put_name(name)?;
        }
        PayloadLayout::NameValue(kind) => {
            let name = name.ok_or(WireError::MissingName(msg_type.as_str()))?;
            let value = value.ok_or(WireError::MissingValue(msg_type.as_str()))?;
            if value.kind() != kind {
                return Err(WireError::ValueKindMismatch {
                    msg_type: msg_type.as_str(),
                    expected: kind,
                    found: value.kind(),
                });
            }
            writer.put_name(name)?;
            writer.put_value(value)?;
        }
        PayloadLayout::Data => {
            if let Some(value) = value {
                return Ok(value.to_raw());
            }
        }
    }
    Ok(writer.finish())
}

fn frame(id: u32, msg_type: MessageType, payload: &[u8]) -> Result<Bytes> {
    let len = u32::try_from(payload.len()).map_err(|_| WireError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    dst.put_u8(PREFIX);
    dst.put_u32_le(id);
    dst.put_u8(msg_type.tag());
    dst.put_u32_le(len);
    dst.put_slice(payload);
    Ok(dst.freeze())
}

/// Encode a response echoing `id`. Responses never consume the counter.
pub fn encode_response(id: u32, msg_type: MessageType, data: &[u8]) -> Result<Bytes> {
    if !msg_type.is_response() {
        return Err(WireError::InvalidCorrelation(format!(
            "{msg_type} is not a response type"
        )));
    }
    frame(id, msg_type, data)
}

/// Decode and validate a header from the first [`HEADER_SIZE`] bytes of `src`.
///
/// The prefix is checked before any other field is interpreted.
pub fn decode_header(src: &[u8]) -> Result<Header> {
    match src.first() {
        None => {
            return Err(WireError::Truncated {
                needed: HEADER_SIZE,
                remaining: 0,
            })
        }
        Some(&found) if found != PREFIX => return Err(WireError::InvalidFraming { found }),
        Some(_) => {}
    }
    let raw: &[u8; HEADER_SIZE] = src
        .get(..HEADER_SIZE)
        .and_then(|head| head.try_into().ok())
        .ok_or(WireError::Truncated {
            needed: HEADER_SIZE,
            remaining: src.len(),
        })?;
    RawHeader::parse(raw).validate()
}

/// Decode the payload of a `msg_type` message. The whole slice must be consumed.
pub fn decode_payload(msg_type: MessageType, src: &[u8]) -> Result<Payload> {
    let mut reader = PayloadReader::new(src);
    let payload = match msg_type.layout() {
        PayloadLayout::Empty => Payload::Empty,
        PayloadLayout::Name => Payload::Name(reader.name()?),
        PayloadLayout::NameValue(kind) => {
            let name = reader.name()?;
            let value = reader.value(kind)?;
            Payload::Assign { name, value }
        }
        PayloadLayout::Data => Payload::Data(Bytes::copy_from_slice(reader.rest())),
    };
    reader.finish()?;
    Ok(payload)
}

/// Check that `header` answers the request sent with `request_id`.
pub fn check_correlation(request_id: u32, header: &Header) -> Result<()> {
    if header.id != request_id {
        return Err(WireError::InvalidCorrelation(format!(
            "response id {} does not match request id {request_id}",
            header.id
        )));
    }
    if !header.msg_type.is_response() {
        return Err(WireError::InvalidCorrelation(format!(
            "expected RSP_OK or RSP_ERROR, got {}",
            header.msg_type
        )));
    }
    Ok(())
}

/// Interpret the data of an `RSP_OK` answering `request_type`.
///
/// Getters yield their typed value, listing and describe requests yield a
/// string, `RUN` yields the command status. Other requests carry no result.
pub fn decode_result(request_type: MessageType, data: &[u8]) -> Result<Option<Value>> {
    if let Some(kind) = request_type.get_kind() {
        return Value::from_raw(kind, data).map(Some);
    }
    match request_type {
        MessageType::ListPlugins | MessageType::PluginListProperties | MessageType::Describe => {
            Value::from_raw(Kind::String, data).map(Some)
        }
        MessageType::Run => Value::from_raw(Kind::Int, data).map(Some),
        _ => Ok(None),
    }
}
