//! Server-side request dispatch.
//!
//! One request is handled at a time, strictly in arrival order:
//!
//! ```text
//! AwaitHeader -> AwaitPayload -> Decode -> Execute -> Encode -> AwaitHeader
//! ```
//!
//! `AwaitPayload` is skipped for empty payloads. Protocol and capability
//! failures become `RSP_ERROR` replies and the loop continues; a stream that
//! closes or fails ends it.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use testgear_plugin::{PluginError, ProviderRegistry};
use testgear_wire::{
    decode_payload, encode_response, Header, Kind, MessageReader, MessageType, MessageWriter,
    Payload, Value, WireError,
};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

/// The outcome of one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok(Bytes),
    Error(String),
}

impl Reply {
    fn ok_empty() -> Self {
        Reply::Ok(Bytes::new())
    }

    fn ok_text(text: &str) -> Self {
        Reply::Ok(Bytes::copy_from_slice(text.as_bytes()))
    }

    fn msg_type(&self) -> MessageType {
        match self {
            Reply::Ok(_) => MessageType::RspOk,
            Reply::Error(_) => MessageType::RspError,
        }
    }

    fn data(&self) -> &[u8] {
        match self {
            Reply::Ok(data) => data,
            Reply::Error(message) => message.as_bytes(),
        }
    }
}

enum State {
    AwaitHeader,
    AwaitPayload { header: Header },
    Drain { id: u32, payload_len: u32, error: WireError },
    Decode { header: Header, payload: Bytes },
    Execute { id: u32, msg_type: MessageType, request: Payload },
    Encode { id: u32, reply: Reply },
}

/// Routes decoded requests to the provider registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: ProviderRegistry,
    handled: u64,
}

impl Dispatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            handled: 0,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    pub fn into_registry(self) -> ProviderRegistry {
        self.registry
    }

    /// Requests answered so far.
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Serve requests until the peer closes the stream.
    pub fn serve<R: Read, W: Write>(
        &mut self,
        reader: &mut MessageReader<R>,
        writer: &mut MessageWriter<W>,
    ) -> Result<()> {
        self.serve_while(reader, writer, &AtomicBool::new(true))
    }

    /// Serve requests until the peer closes the stream or `running` is cleared.
    ///
    /// `running` is checked between requests. A peer that closes the stream
    /// between requests ends the loop with `Ok`; closing mid-message is
    /// [`SessionError::Disconnected`].
    pub fn serve_while<R: Read, W: Write>(
        &mut self,
        reader: &mut MessageReader<R>,
        writer: &mut MessageWriter<W>,
        running: &AtomicBool,
    ) -> Result<()> {
        let mut state = State::AwaitHeader;
        loop {
            state = match state {
                State::AwaitHeader => {
                    if !running.load(Ordering::SeqCst) {
                        info!(handled = self.handled, "dispatcher stopping");
                        return Ok(());
                    }
                    let raw = match reader.read_header() {
                        Ok(raw) => raw,
                        Err(WireError::ConnectionClosed) => {
                            info!(handled = self.handled, "peer closed connection");
                            return Ok(());
                        }
                        Err(err) => return Err(err.into()),
                    };
                    match raw.validate() {
                        Ok(header) if header.payload_len == 0 => State::Decode {
                            header,
                            payload: Bytes::new(),
                        },
                        Ok(header) => State::AwaitPayload { header },
                        Err(error) => State::Drain {
                            id: raw.id,
                            payload_len: raw.payload_len,
                            error,
                        },
                    }
                }
                State::AwaitPayload { header } => {
                    let payload = reader.read_payload(header.payload_len)?;
                    State::Decode { header, payload }
                }
                State::Drain {
                    id,
                    payload_len,
                    error,
                } => {
                    warn!(id, error = %error, "rejecting malformed header");
                    reader.read_payload(payload_len)?;
                    State::Encode {
                        id,
                        reply: Reply::Error(error.to_string()),
                    }
                }
                State::Decode { header, payload } => {
                    debug!(
                        id = header.id,
                        msg_type = header.msg_type.as_str(),
                        payload_len = header.payload_len,
                        "received request"
                    );
                    match decode_request(header.msg_type, &payload) {
                        Ok(request) => State::Execute {
                            id: header.id,
                            msg_type: header.msg_type,
                            request,
                        },
                        Err(message) => State::Encode {
                            id: header.id,
                            reply: Reply::Error(message),
                        },
                    }
                }
                State::Execute {
                    id,
                    msg_type,
                    request,
                } => State::Encode {
                    id,
                    reply: self.execute(msg_type, request),
                },
                State::Encode { id, reply } => {
                    let reply = fit_reply(reply, writer.config().max_payload_size);
                    let bytes = encode_response(id, reply.msg_type(), reply.data())?;
                    writer.write_message(&bytes)?;
                    self.handled += 1;
                    debug!(
                        id,
                        msg_type = reply.msg_type().as_str(),
                        payload_len = reply.data().len(),
                        "sent response"
                    );
                    State::AwaitHeader
                }
            };
        }
    }

    /// Execute one decoded request against the registry.
    pub fn execute(&mut self, msg_type: MessageType, request: Payload) -> Reply {
        match (msg_type, request) {
            (MessageType::ListPlugins, _) => Reply::ok_text(&self.registry.list().join(",")),
            (MessageType::PluginLoad, Payload::Name(name)) => match self.registry.load(&name) {
                Ok(()) => Reply::ok_empty(),
                Err(err) => Reply::Error(format!("Failed to load {name} plugin: {err}")),
            },
            (MessageType::PluginUnload, Payload::Name(name)) => match self.registry.unload(&name) {
                Ok(()) => Reply::ok_empty(),
                Err(err) => Reply::Error(format!("Failed to unload {name} plugin: {err}")),
            },
            (MessageType::PluginListProperties, Payload::Name(name)) => {
                match self.registry.provider(&name) {
                    Ok(table) => Reply::ok_text(&format_properties(&table.list())),
                    Err(err) => Reply::Error(format!("Failed to list plugin properties: {err}")),
                }
            }
            (MessageType::Run, Payload::Name(dotted)) => {
                let status = self
                    .registry
                    .resolve_mut(&dotted)
                    .and_then(|(table, member)| table.run(member));
                match status {
                    Ok(status) => Reply::Ok(Value::Int(status).to_raw()),
                    Err(err) => Reply::Error(capability_error(&dotted, None, err)),
                }
            }
            (MessageType::Describe, Payload::Name(dotted)) => {
                let text = self
                    .registry
                    .resolve(&dotted)
                    .and_then(|(table, member)| table.describe(member).map(str::to_owned));
                match text {
                    Ok(text) => Reply::ok_text(&text),
                    Err(err) => Reply::Error(capability_error(&dotted, None, err)),
                }
            }
            (msg_type, Payload::Name(dotted)) if msg_type.get_kind().is_some() => {
                let kind = msg_type.get_kind();
                let value = self
                    .registry
                    .resolve(&dotted)
                    .and_then(|(table, member)| table.get(member, kind));
                match value {
                    Ok(value) => Reply::Ok(value.to_raw()),
                    Err(err) => Reply::Error(capability_error(&dotted, kind, err)),
                }
            }
            (msg_type, Payload::Assign { name, value }) if msg_type.set_kind().is_some() => {
                let kind = Some(value.kind());
                let stored = self
                    .registry
                    .resolve_mut(&name)
                    .and_then(|(table, member)| table.set(member, value));
                match stored {
                    Ok(()) => Reply::ok_empty(),
                    Err(err) => Reply::Error(capability_error(&name, kind, err)),
                }
            }
            (msg_type, _) => Reply::Error(format!("Unexpected message type {msg_type}")),
        }
    }
}

fn decode_request(msg_type: MessageType, payload: &[u8]) -> std::result::Result<Payload, String> {
    if msg_type.is_response() {
        return Err(format!("Unexpected message type {msg_type}"));
    }
    decode_payload(msg_type, payload).map_err(|err| format!("Malformed {msg_type} request: {err}"))
}

/// `name:kind,name:kind,...` without a trailing separator.
pub fn format_properties(entries: &[(&str, Kind)]) -> String {
    entries
        .iter()
        .map(|(name, kind)| format!("{name}:{kind}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn capability_error(dotted: &str, kind: Option<Kind>, err: PluginError) -> String {
    match (err, kind) {
        (PluginError::NotFound { what: "command", .. }, _) => {
            format!("Command {dotted} not found")
        }
        (PluginError::NotFound { what: "variable or command", .. }, _) => {
            format!("Variable or command {dotted} not found")
        }
        (PluginError::NotFound { what: "provider", name }, _) => {
            format!("Plugin {name} not loaded ({dotted} not found)")
        }
        (PluginError::NotFound { .. }, Some(kind)) => {
            format!("Variable {dotted} of {kind} type not found")
        }
        (PluginError::NotFound { .. }, None) => format!("{dotted} not found"),
        (PluginError::KindMismatch { expected, found, .. }, _) => {
            format!("Variable {dotted} is of {found} type, not {expected}")
        }
        (PluginError::ReadOnly(_), _) => format!("Variable {dotted} is read-only"),
        (other, _) => format!("{dotted}: {other}"),
    }
}

fn fit_reply(reply: Reply, max: usize) -> Reply {
    if reply.data().len() <= max {
        return reply;
    }
    warn!(size = reply.data().len(), max, "response exceeds payload limit");
    Reply::Error(format!(
        "Response too large ({} bytes, max {max})",
        reply.data().len()
    ))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use testgear_plugin::BuiltinLoader;
    use testgear_wire::{decode_header, MessageEncoder, HEADER_SIZE, PREFIX};

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(ProviderRegistry::new(BuiltinLoader::new()))
    }

    fn name(text: &str) -> Payload {
        Payload::Name(text.to_string())
    }

    fn text(reply: &Reply) -> String {
        String::from_utf8_lossy(reply.data()).into_owned()
    }

    #[test]
    fn load_list_and_unload() {
        let mut d = dispatcher();
        assert_eq!(
            d.execute(MessageType::PluginLoad, name("dummy")),
            Reply::ok_empty()
        );
        d.execute(MessageType::PluginLoad, name("shell"));
        assert_eq!(
            d.execute(MessageType::ListPlugins, Payload::Empty),
            Reply::ok_text("dummy,shell")
        );

        let again = d.execute(MessageType::PluginLoad, name("dummy"));
        assert!(matches!(&again, Reply::Error(_)));
        assert!(text(&again).starts_with("Failed to load dummy plugin"));

        assert_eq!(
            d.execute(MessageType::PluginUnload, name("dummy")),
            Reply::ok_empty()
        );
        let gone = d.execute(MessageType::PluginUnload, name("dummy"));
        assert!(text(&gone).starts_with("Failed to unload dummy plugin"));
    }

    #[test]
    fn list_properties_format() {
        let mut d = dispatcher();
        d.execute(MessageType::PluginLoad, name("shell"));
        assert_eq!(
            d.execute(MessageType::PluginListProperties, name("shell")),
            Reply::ok_text("command:string,run:command")
        );
        assert!(matches!(
            d.execute(MessageType::PluginListProperties, name("fb")),
            Reply::Error(_)
        ));
    }

    #[test]
    fn get_and_set_through_registry() {
        let mut d = dispatcher();
        d.execute(MessageType::PluginLoad, name("dummy"));

        assert_eq!(
            d.execute(MessageType::GetInt, name("dummy.int0")),
            Reply::Ok(Bytes::from_static(&[0, 0, 0, 0]))
        );
        let set = Payload::Assign {
            name: "dummy.short0".to_string(),
            value: Value::Short(-2),
        };
        assert_eq!(d.execute(MessageType::SetShort, set), Reply::ok_empty());
        assert_eq!(
            d.execute(MessageType::GetShort, name("dummy.short0")),
            Reply::Ok(Value::Short(-2).to_raw())
        );
        assert_eq!(
            d.execute(MessageType::GetString, name("dummy.name")),
            Reply::ok_text("dummy")
        );
    }

    #[test]
    fn capability_errors_are_descriptive() {
        let mut d = dispatcher();
        d.execute(MessageType::PluginLoad, name("dummy"));

        let reply = d.execute(MessageType::GetInt, name("dummy.nope"));
        assert_eq!(text(&reply), "Variable dummy.nope of int type not found");

        let reply = d.execute(MessageType::GetInt, name("dummy.string0"));
        assert_eq!(text(&reply), "Variable dummy.string0 is of string type, not int");

        let reply = d.execute(
            MessageType::SetString,
            Payload::Assign {
                name: "dummy.version".to_string(),
                value: Value::String("9".to_string()),
            },
        );
        assert_eq!(text(&reply), "Variable dummy.version is read-only");

        let reply = d.execute(MessageType::Run, name("dummy.missing_command"));
        assert!(matches!(reply, Reply::Error(_)));
        assert!(text(&reply).contains("dummy"));
        assert!(text(&reply).contains("missing_command"));

        let reply = d.execute(MessageType::GetInt, name("int0"));
        assert!(matches!(reply, Reply::Error(_)));
    }

    #[test]
    fn run_and_describe() {
        let mut d = dispatcher();
        d.execute(MessageType::PluginLoad, name("dummy"));
        assert_eq!(
            d.execute(MessageType::Run, name("dummy.command0")),
            Reply::Ok(Value::Int(0).to_raw())
        );
        assert_eq!(
            d.execute(MessageType::Describe, name("dummy.int0")),
            Reply::ok_text("Test int 0")
        );
        assert_eq!(
            d.execute(MessageType::Describe, name("dummy.")),
            Reply::ok_text("Dummy plugin (for testing only)")
        );
        assert_eq!(
            d.execute(MessageType::Describe, name("dummy.license")),
            Reply::ok_text("Plugin license")
        );
    }

    #[test]
    fn response_types_are_rejected() {
        let mut d = dispatcher();
        let reply = d.execute(MessageType::RspOk, Payload::Data(Bytes::new()));
        assert_eq!(text(&reply), "Unexpected message type RSP_OK");
    }

    fn requests(messages: &[(MessageType, Option<&str>, Option<Value>)]) -> Vec<u8> {
        let mut enc = MessageEncoder::new();
        let mut wire = Vec::new();
        for (msg_type, name, value) in messages {
            let (bytes, _) = enc.encode(*msg_type, *name, value.as_ref()).unwrap();
            wire.extend_from_slice(&bytes);
        }
        wire
    }

    fn responses(mut wire: &[u8]) -> Vec<(Header, Vec<u8>)> {
        let mut out = Vec::new();
        while !wire.is_empty() {
            let header = decode_header(wire).unwrap();
            let end = HEADER_SIZE + header.payload_len as usize;
            out.push((header, wire[HEADER_SIZE..end].to_vec()));
            wire = &wire[end..];
        }
        out
    }

    #[test]
    fn serve_answers_each_request_once() {
        let wire = requests(&[
            (MessageType::PluginLoad, Some("dummy"), None),
            (MessageType::GetInt, Some("dummy.int0"), None),
            (
                MessageType::SetString,
                Some("dummy.string0"),
                Some(Value::String("Hi world!".to_string())),
            ),
            (MessageType::GetString, Some("dummy.string0"), None),
            (MessageType::Run, Some("dummy.missing_command"), None),
        ]);

        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        d.serve(&mut reader, &mut writer).unwrap();
        assert_eq!(d.handled(), 5);

        let out = responses(writer.get_ref());
        assert_eq!(out.len(), 5);
        for (idx, (header, _)) in out.iter().enumerate() {
            assert_eq!(header.id, idx as u32);
        }
        assert_eq!(out[0].0.msg_type, MessageType::RspOk);
        assert_eq!(out[0].0.payload_len, 0);
        assert_eq!(out[1].1, vec![0u8; 4]);
        assert_eq!(out[3].1, b"Hi world!".to_vec());
        assert_eq!(out[4].0.msg_type, MessageType::RspError);
    }

    #[test]
    fn bad_prefix_gets_error_reply_and_loop_continues() {
        let mut wire = vec![0x00, 7, 0, 0, 0, MessageType::PluginLoad.tag(), 2, 0, 0, 0, b'x', b'y'];
        wire.extend(requests(&[(MessageType::ListPlugins, None, None)]));

        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        d.serve(&mut reader, &mut writer).unwrap();

        let out = responses(writer.get_ref());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0.id, 7);
        assert_eq!(out[0].0.msg_type, MessageType::RspError);
        assert!(String::from_utf8_lossy(&out[0].1).contains("invalid framing"));
        assert_eq!(out[1].0.msg_type, MessageType::RspOk);
    }

    #[test]
    fn unknown_type_gets_error_reply() {
        let wire = vec![PREFIX, 3, 0, 0, 0, 99, 0, 0, 0, 0];
        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        d.serve(&mut reader, &mut writer).unwrap();

        let out = responses(writer.get_ref());
        assert_eq!(out[0].0.id, 3);
        assert!(String::from_utf8_lossy(&out[0].1).contains("unknown message type 99"));
    }

    #[test]
    fn malformed_payload_gets_error_reply() {
        let wire = vec![
            PREFIX,
            1,
            0,
            0,
            0,
            MessageType::PluginLoad.tag(),
            3,
            0,
            0,
            0,
            9,
            b'a',
            b'b',
        ];
        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        d.serve(&mut reader, &mut writer).unwrap();

        let out = responses(writer.get_ref());
        assert_eq!(out[0].0.msg_type, MessageType::RspError);
        assert!(String::from_utf8_lossy(&out[0].1).starts_with("Malformed PLUGIN_LOAD request"));
    }

    #[test]
    fn closing_mid_payload_is_disconnect() {
        let mut wire = requests(&[(MessageType::PluginLoad, Some("dummy"), None)]);
        wire.truncate(HEADER_SIZE + 2);

        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        let err = d.serve(&mut reader, &mut writer).unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(_)));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn closing_mid_header_is_disconnect() {
        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(vec![PREFIX, 1, 0]));
        let mut writer = MessageWriter::new(Vec::new());
        let err = d.serve(&mut reader, &mut writer).unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(_)));
        assert!(writer.get_ref().is_empty());
        assert_eq!(d.handled(), 0);
    }

    #[test]
    fn closing_between_requests_is_clean() {
        let wire = requests(&[(MessageType::ListPlugins, None, None)]);
        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        d.serve(&mut reader, &mut writer).unwrap();
        assert_eq!(d.handled(), 1);
    }

    #[test]
    fn cleared_flag_stops_before_next_request() {
        let wire = requests(&[(MessageType::ListPlugins, None, None)]);
        let mut d = dispatcher();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let mut writer = MessageWriter::new(Vec::new());
        d.serve_while(&mut reader, &mut writer, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(d.handled(), 0);
    }
}
