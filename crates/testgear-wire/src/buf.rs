//! Bounds-checked payload cursors.
//!
//! [`PayloadWriter`] validates every length-prefixed field before appending,
//! so an oversized field never leaves partial bytes behind. [`PayloadReader`]
//! tracks the remaining input and fails with [`WireError::Truncated`] instead
//! of reading past the end.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::message::{MAX_NAME_LEN, MAX_STRING_LEN};
use crate::value::{Kind, Value};

/// Appends payload fields to a buffer.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `[len:1][name]`.
    pub fn put_name(&mut self, name: &str) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(WireError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        self.buf.put_u8(name.len() as u8);
        self.buf.put_slice(name.as_bytes());
        Ok(())
    }

    /// A setter value: fixed width for scalars, `[len:1]` for strings and
    /// `[len:4 LE]` for data.
    pub fn put_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::String(text) => {
                if text.len() > MAX_STRING_LEN {
                    return Err(WireError::ValueTooLong {
                        len: text.len(),
                        max: MAX_STRING_LEN,
                    });
                }
                self.buf.put_u8(text.len() as u8);
                self.buf.put_slice(text.as_bytes());
            }
            Value::Data(data) => {
                let len = u32::try_from(data.len()).map_err(|_| WireError::ValueTooLong {
                    len: data.len(),
                    max: u32::MAX as usize,
                })?;
                self.buf.put_u32_le(len);
                self.buf.put_slice(data);
            }
            scalar => scalar.put_raw(&mut self.buf),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads payload fields from a byte slice.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.src.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.src[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u32_le(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// `[len:1][name]`.
    pub fn name(&mut self) -> Result<String> {
        let len = self.take_u8()? as usize;
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8("name"))
    }

    /// A setter value of `kind`, mirroring [`PayloadWriter::put_value`].
    pub fn value(&mut self, kind: Kind) -> Result<Value> {
        let raw = match kind.width() {
            Some(width) => self.take(width)?,
            None => match kind {
                Kind::String => {
                    let len = self.take_u8()? as usize;
                    self.take(len)?
                }
                Kind::Data => {
                    let len = self.take_u32_le()? as usize;
                    self.take(len)?
                }
                _ => return Err(WireError::TrailingBytes(self.remaining())),
            },
        };
        Value::from_raw(kind, raw)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.src[self.pos..];
        self.pos = self.src.len();
        out
    }

    /// Fail if any bytes remain.
    pub fn finish(self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(WireError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_length_prefixed() {
        let mut w = PayloadWriter::new();
        w.put_name("dummy").unwrap();
        assert_eq!(w.finish().as_ref(), b"\x05dummy");
    }

    #[test]
    fn oversized_name_writes_nothing() {
        let mut w = PayloadWriter::new();
        let err = w.put_name(&"n".repeat(MAX_NAME_LEN + 1)).unwrap_err();
        assert!(matches!(err, WireError::NameTooLong { len: 256, .. }));
        assert!(w.is_empty());
    }

    #[test]
    fn max_length_name_fits() {
        let mut w = PayloadWriter::new();
        w.put_name(&"n".repeat(MAX_NAME_LEN)).unwrap();
        assert_eq!(w.len(), MAX_NAME_LEN + 1);
    }

    #[test]
    fn oversized_string_rejected() {
        let mut w = PayloadWriter::new();
        let err = w
            .put_value(&Value::String("s".repeat(MAX_STRING_LEN + 1)))
            .unwrap_err();
        assert!(matches!(err, WireError::ValueTooLong { .. }));
        assert!(w.is_empty());
    }

    #[test]
    fn reader_reports_truncation() {
        let mut r = PayloadReader::new(b"\x09abc");
        let err = r.name().unwrap_err();
        assert!(matches!(
            err,
            WireError::Truncated {
                needed: 9,
                remaining: 3
            }
        ));
    }

    #[test]
    fn reader_reads_data_value() {
        let mut w = PayloadWriter::new();
        w.put_value(&Value::Data(Bytes::from_static(b"\x00\x01\x02")))
            .unwrap();
        let bytes = w.finish();
        assert_eq!(bytes.len(), 4 + 3);

        let mut r = PayloadReader::new(&bytes);
        assert_eq!(
            r.value(Kind::Data).unwrap(),
            Value::Data(Bytes::from_static(b"\x00\x01\x02"))
        );
        r.finish().unwrap();
    }

    #[test]
    fn finish_rejects_leftovers() {
        let mut r = PayloadReader::new(b"\x01ab");
        assert_eq!(r.name().unwrap(), "a");
        assert!(matches!(r.finish(), Err(WireError::TrailingBytes(1))));
    }
}
