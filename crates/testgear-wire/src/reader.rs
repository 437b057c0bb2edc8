use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use testgear_transport::Stream;
use tracing::trace;

use crate::codec::WireConfig;
use crate::error::{Result, WireError};
use crate::message::{Message, RawHeader, HEADER_SIZE};

/// Reads framed messages from any `Read` stream.
///
/// Handles partial reads internally. A stream that ends exactly on a message
/// boundary yields [`WireError::ConnectionClosed`]; one that ends inside a
/// header or payload yields [`WireError::UnexpectedEof`].
pub struct MessageReader<T> {
    inner: T,
    config: WireConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: WireConfig) -> Self {
        Self { inner, config }
    }

    /// Read the fixed-size header without validating it.
    pub fn read_header(&mut self) -> Result<RawHeader> {
        let mut head = [0u8; HEADER_SIZE];
        self.fill(&mut head, true)?;
        let raw = RawHeader::parse(&head);
        trace!(
            id = raw.id,
            type_tag = raw.type_tag,
            payload_len = raw.payload_len,
            "read header"
        );
        Ok(raw)
    }

    /// Read exactly `len` payload bytes, refusing lengths over the configured cap.
    pub fn read_payload(&mut self, len: u32) -> Result<Bytes> {
        let len = len as usize;
        if len > self.config.max_payload_size {
            return Err(WireError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }
        if len == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = BytesMut::zeroed(len);
        self.fill(&mut buf, false)?;
        Ok(buf.freeze())
    }

    /// Read the next complete, header-validated message (blocking).
    pub fn read_message(&mut self) -> Result<Message> {
        let header = self.read_header()?.validate()?;
        let payload = self.read_payload(header.payload_len)?;
        Ok(Message { header, payload })
    }

    /// `at_boundary` marks reads that start a new message, where EOF before
    /// the first byte is a clean close.
    fn fill(&mut self, dst: &mut [u8], at_boundary: bool) -> Result<()> {
        let mut offset = 0usize;
        while offset < dst.len() {
            match self.inner.read(&mut dst[offset..]) {
                Ok(0) if at_boundary && offset == 0 => return Err(WireError::ConnectionClosed),
                Ok(0) => {
                    return Err(WireError::UnexpectedEof {
                        received: offset,
                        expected: dst.len(),
                    })
                }
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &WireConfig {
        &self.config
    }
}

impl MessageReader<Stream> {
    /// Create a reader for a transport stream and apply the read timeout from config.
    pub fn with_config_stream(inner: Stream, config: WireConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_wire_error(err: testgear_transport::TransportError) -> WireError {
    use testgear_transport::TransportError;

    match err {
        TransportError::Io(io) | TransportError::Accept(io) => WireError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            WireError::Io(source)
        }
        other => WireError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::{encode_response, MessageEncoder};
    use crate::message::{MessageType, PREFIX};

    #[test]
    fn read_single_message() {
        let mut enc = MessageEncoder::new();
        let (wire, id) = enc
            .encode(MessageType::PluginLoad, Some("dummy"), None)
            .unwrap();

        let mut reader = MessageReader::new(Cursor::new(wire.to_vec()));
        let msg = reader.read_message().unwrap();

        assert_eq!(msg.id(), id);
        assert_eq!(msg.msg_type(), MessageType::PluginLoad);
        assert_eq!(msg.payload.as_ref(), b"\x05dummy");
    }

    #[test]
    fn read_back_to_back_messages() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&encode_response(1, MessageType::RspOk, b"").unwrap());
        wire.extend_from_slice(&encode_response(2, MessageType::RspError, b"nope").unwrap());

        let mut reader = MessageReader::new(Cursor::new(wire));
        let first = reader.read_message().unwrap();
        let second = reader.read_message().unwrap();

        assert_eq!((first.id(), first.payload.len()), (1, 0));
        assert_eq!(second.msg_type(), MessageType::RspError);
        assert_eq!(second.payload.as_ref(), b"nope");
    }

    #[test]
    fn partial_read_handling() {
        let wire = encode_response(4, MessageType::RspOk, b"slow").unwrap();
        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut reader = MessageReader::new(byte_reader);

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.id(), 4);
        assert_eq!(msg.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut reader = MessageReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_payload() {
        let mut partial = encode_response(9, MessageType::RspOk, b"0123456789").unwrap().to_vec();
        partial.truncate(HEADER_SIZE + 3);

        let mut reader = MessageReader::new(Cursor::new(partial));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(
            err,
            WireError::UnexpectedEof {
                received: 3,
                expected: 10
            }
        ));
    }

    #[test]
    fn connection_closed_mid_header() {
        let mut reader = MessageReader::new(Cursor::new(vec![PREFIX, 1, 0]));
        let err = reader.read_header().unwrap_err();
        assert!(matches!(
            err,
            WireError::UnexpectedEof {
                received: 3,
                expected: HEADER_SIZE
            }
        ));
    }

    #[test]
    fn connection_closed_before_payload() {
        let mut whole = encode_response(9, MessageType::RspOk, b"abc").unwrap().to_vec();
        whole.truncate(HEADER_SIZE);

        let mut reader = MessageReader::new(Cursor::new(whole));
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::UnexpectedEof { received: 0, expected: 3 }));
    }

    #[test]
    fn invalid_prefix_in_stream() {
        let bytes = vec![0x00, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut reader = MessageReader::new(Cursor::new(bytes.clone()));
        assert!(matches!(
            reader.read_message(),
            Err(WireError::InvalidFraming { found: 0 })
        ));

        let mut reader = MessageReader::new(Cursor::new(bytes));
        let raw = reader.read_header().unwrap();
        assert_eq!(raw.id, 1);
        assert_ne!(raw.prefix, PREFIX);
    }

    #[test]
    fn oversized_payload_in_stream() {
        let mut wire = vec![PREFIX, 0, 0, 0, 0, MessageType::RspOk.tag()];
        wire.extend_from_slice(&1024u32.to_le_bytes());

        let cfg = WireConfig {
            max_payload_size: 16,
            ..WireConfig::default()
        };
        let mut reader = MessageReader::with_config(Cursor::new(wire), cfg);
        let err = reader.read_message().unwrap_err();
        assert!(matches!(err, WireError::PayloadTooLarge { size: 1024, max: 16 }));
    }

    #[test]
    fn interrupted_read_retries() {
        let wire = encode_response(8, MessageType::RspOk, b"ok").unwrap();
        let reader = InterruptedThenData {
            interrupted: false,
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut framed = MessageReader::new(reader);
        let msg = framed.read_message().unwrap();

        assert_eq!(msg.id(), 8);
        assert_eq!(msg.payload.as_ref(), b"ok");
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::MessageWriter::new(left);
        let mut reader = MessageReader::new(right);

        let mut enc = MessageEncoder::new();
        let (bytes, id) = enc.encode(MessageType::GetInt, Some("dummy.int0"), None).unwrap();
        writer.write_message(&bytes).unwrap();

        let msg = reader.read_message().unwrap();
        assert_eq!(msg.id(), id);
        assert_eq!(msg.msg_type(), MessageType::GetInt);
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
