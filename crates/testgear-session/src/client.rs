//! Client-side request correlation.

use std::io::{Read, Write};

use bytes::Bytes;
use testgear_transport::Stream;
use testgear_wire::{
    check_correlation, decode_result, Kind, MessageEncoder, MessageReader, MessageType,
    MessageWriter, Value, WireConfig, WireError,
};
use tracing::debug;

use crate::error::{Result, SessionError};

/// Issues requests and waits for their correlated responses.
///
/// One request is outstanding at a time. An `RSP_ERROR` answer is returned as
/// [`SessionError::Remote`]; a stream that ends mid-message is
/// [`SessionError::Disconnected`].
pub struct Client<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
    encoder: MessageEncoder,
}

impl<R: Read, W: Write> Client<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, WireConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: WireConfig) -> Self {
        Self::from_parts(
            MessageReader::with_config(reader, config.clone()),
            MessageWriter::with_config(writer, config),
        )
    }

    pub fn from_parts(reader: MessageReader<R>, writer: MessageWriter<W>) -> Self {
        Self {
            reader,
            writer,
            encoder: MessageEncoder::new(),
        }
    }

    /// Send one request and return the decoded result of its `RSP_OK`.
    ///
    /// The response header's prefix and type are checked before its payload is
    /// read. The id is compared after the declared payload has been consumed,
    /// so a mismatched response still leaves the stream on a message boundary.
    pub fn submit(
        &mut self,
        msg_type: MessageType,
        name: Option<&str>,
        value: Option<&Value>,
    ) -> Result<Option<Value>> {
        let (bytes, id) = self.encoder.encode(msg_type, name, value)?;
        self.writer.write_message(&bytes)?;

        let raw = self.reader.read_header()?;
        let header = match raw.validate_response() {
            Ok(header) => header,
            Err(err @ WireError::InvalidCorrelation(_)) => {
                self.reader.read_payload(raw.payload_len)?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };
        let payload = self.reader.read_payload(header.payload_len)?;
        check_correlation(id, &header)?;
        debug!(
            id,
            msg_type = header.msg_type.as_str(),
            payload_len = header.payload_len,
            "received response"
        );

        match header.msg_type {
            MessageType::RspError => Err(SessionError::Remote(
                String::from_utf8_lossy(&payload).into_owned(),
            )),
            _ => Ok(decode_result(msg_type, &payload)?),
        }
    }

    fn submit_name(&mut self, msg_type: MessageType, name: &str) -> Result<Option<Value>> {
        self.submit(msg_type, Some(name), None)
    }

    fn submit_text(&mut self, msg_type: MessageType, name: Option<&str>) -> Result<String> {
        match self.submit(msg_type, name, None)? {
            Some(Value::String(text)) => Ok(text),
            other => Err(unexpected(msg_type, other)),
        }
    }

    /// Names of loaded providers, in load order.
    pub fn list_plugins(&mut self) -> Result<Vec<String>> {
        let text = self.submit_text(MessageType::ListPlugins, None)?;
        Ok(text
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect())
    }

    pub fn load(&mut self, provider: &str) -> Result<()> {
        self.submit_name(MessageType::PluginLoad, provider)
            .map(|_| ())
    }

    pub fn unload(&mut self, provider: &str) -> Result<()> {
        self.submit_name(MessageType::PluginUnload, provider)
            .map(|_| ())
    }

    /// Capabilities of a provider as `(name, kind)`, in definition order.
    pub fn list_properties(&mut self, provider: &str) -> Result<Vec<(String, Kind)>> {
        let text = self.submit_text(MessageType::PluginListProperties, Some(provider))?;
        text.split(',')
            .filter(|entry| !entry.is_empty())
            .map(|entry| -> Result<(String, Kind)> {
                let (name, kind) = entry.rsplit_once(':').ok_or_else(|| {
                    SessionError::UnexpectedResponse(format!("malformed property '{entry}'"))
                })?;
                let kind = kind
                    .parse::<Kind>()
                    .map_err(SessionError::UnexpectedResponse)?;
                Ok((name.to_string(), kind))
            })
            .collect()
    }

    /// Read a variable of `kind` by dotted name.
    pub fn get(&mut self, kind: Kind, dotted: &str) -> Result<Value> {
        let msg_type = MessageType::get_for(kind).ok_or_else(|| {
            SessionError::UnexpectedResponse(format!("{kind} entries cannot be read"))
        })?;
        match self.submit_name(msg_type, dotted)? {
            Some(value) => Ok(value),
            None => Err(unexpected(msg_type, None)),
        }
    }

    /// Write a variable by dotted name. The value's kind selects the message type.
    pub fn set(&mut self, dotted: &str, value: &Value) -> Result<()> {
        let msg_type = MessageType::set_for(value.kind()).ok_or_else(|| {
            SessionError::UnexpectedResponse(format!("{} entries cannot be written", value.kind()))
        })?;
        self.submit(msg_type, Some(dotted), Some(value)).map(|_| ())
    }

    /// Run a command and return its status.
    pub fn run(&mut self, dotted: &str) -> Result<i32> {
        match self.submit_name(MessageType::Run, dotted)? {
            Some(Value::Int(status)) => Ok(status),
            other => Err(unexpected(MessageType::Run, other)),
        }
    }

    /// Describe a capability; `provider.` describes the provider itself.
    pub fn describe(&mut self, dotted: &str) -> Result<String> {
        self.submit_text(MessageType::Describe, Some(dotted))
    }

    /// Borrow the message reader.
    pub fn reader(&self) -> &MessageReader<R> {
        &self.reader
    }

    /// Borrow the message writer.
    pub fn writer(&self) -> &MessageWriter<W> {
        &self.writer
    }
}

macro_rules! typed_requests {
    ($($get:ident, $set:ident, $variant:ident, $ty:ty;)*) => {
        impl<R: Read, W: Write> Client<R, W> {
            $(
                pub fn $get(&mut self, dotted: &str) -> Result<$ty> {
                    match self.get(Kind::$variant, dotted)? {
                        Value::$variant(v) => Ok(v),
                        other => Err(unexpected(
                            MessageType::get_for(Kind::$variant).unwrap_or(MessageType::RspOk),
                            Some(other),
                        )),
                    }
                }

                pub fn $set(&mut self, dotted: &str, value: impl Into<$ty>) -> Result<()> {
                    self.set(dotted, &Value::$variant(value.into()))
                }
            )*
        }
    };
}

typed_requests! {
    get_char, set_char, Char, i8;
    get_short, set_short, Short, i16;
    get_int, set_int, Int, i32;
    get_long, set_long, Long, i64;
    get_float, set_float, Float, f32;
    get_double, set_double, Double, f64;
    get_string, set_string, String, String;
    get_data, set_data, Data, Bytes;
}

impl Client<Stream, Stream> {
    /// Split a connected stream into reader and writer halves and apply timeouts.
    pub fn from_stream(stream: Stream, config: WireConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        let reader = MessageReader::with_config_stream(reader_stream, config.clone())?;
        let writer = MessageWriter::with_config_stream(stream, config)?;
        Ok(Self::from_parts(reader, writer))
    }
}

fn unexpected(msg_type: MessageType, value: Option<Value>) -> SessionError {
    let found = match value {
        Some(value) => format!("{} value", value.kind()),
        None => "no value".to_string(),
    };
    SessionError::UnexpectedResponse(format!("{msg_type} answered with {found}"))
}
