use std::io::{ErrorKind, Write};

use testgear_transport::Stream;

use crate::codec::WireConfig;
use crate::error::{Result, WireError};
use crate::message::HEADER_SIZE;
use crate::reader::transport_to_wire_error;

/// Writes encoded messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    config: WireConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: WireConfig) -> Self {
        Self { inner, config }
    }

    /// Write one encoded message (header and payload) and flush.
    ///
    /// An expired write timeout surfaces as [`WireError::Io`] with kind
    /// `WouldBlock` or `TimedOut`.
    pub fn write_message(&mut self, bytes: &[u8]) -> Result<()> {
        let payload_len = bytes.len().saturating_sub(HEADER_SIZE);
        if payload_len > self.config.max_payload_size {
            return Err(WireError::PayloadTooLarge {
                size: payload_len,
                max: self.config.max_payload_size,
            });
        }

        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &WireConfig {
        &self.config
    }
}

impl MessageWriter<Stream> {
    /// Create a writer for a transport stream and apply the write timeout from config.
    pub fn with_config_stream(inner: Stream, config: WireConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}
