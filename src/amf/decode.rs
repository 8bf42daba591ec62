// AMF decoder cursor
//
// Kept deliberately separate from the buffer it reads: the chunk demuxer
// owns the reassembled message body, and the cursor is just a read head
// into it. This lets `AMF0Value::decode`/`AMF3Value::decode` borrow the
// buffer without needing to own a copy.

use byteorder::{BigEndian, ByteOrder};

use crate::error::CodecError;

/// Cursor for AMF decoding.
pub struct AMFDecodingCursor {
    /// Current position
    pos: usize,

    // Length
    len: usize,
}

impl AMFDecodingCursor {
    /// Creates a cursor over a buffer of the given length, positioned at 0.
    pub fn new(len: usize) -> Self {
        AMFDecodingCursor { pos: 0, len }
    }

    /// Reads bytes
    pub fn read<'a>(&mut self, buffer: &'a [u8], n: usize) -> Result<&'a [u8], ()> {
        if self.pos + n > self.len {
            return Err(());
        }

        let pos = self.pos;
        self.pos += n;

        let r: &'a [u8] = &buffer[pos..(pos + n)];

        Ok(r)
    }

    /// Reads bytes, without changing the cursor
    pub fn look<'a>(&self, buffer: &'a [u8], n: usize) -> Result<&'a [u8], ()> {
        if self.pos + n > self.len {
            return Err(());
        }

        let r: &'a [u8] = &buffer[self.pos..(self.pos + n)];

        Ok(r)
    }

    /// Skips bytes
    pub fn skip(&mut self, n: usize) -> Result<(), ()> {
        if self.pos + n > self.len {
            return Err(());
        }

        self.pos += n;

        Ok(())
    }

    /// Returns true if the cursor is at the end
    pub fn ended(&self) -> bool {
        self.pos >= self.len
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self, buffer: &[u8]) -> Result<u8, CodecError> {
        let b = self
            .read(buffer, 1)
            .map_err(|_| CodecError::Decode("unexpected end of AMF data".to_string()))?;
        Ok(b[0])
    }

    /// Reads a big-endian u16.
    pub fn read_u16_be(&mut self, buffer: &[u8]) -> Result<u16, CodecError> {
        let b = self
            .read(buffer, 2)
            .map_err(|_| CodecError::Decode("unexpected end of AMF data".to_string()))?;
        Ok(BigEndian::read_u16(b))
    }

    /// Reads a big-endian u32.
    pub fn read_u32_be(&mut self, buffer: &[u8]) -> Result<u32, CodecError> {
        let b = self
            .read(buffer, 4)
            .map_err(|_| CodecError::Decode("unexpected end of AMF data".to_string()))?;
        Ok(BigEndian::read_u32(b))
    }

    /// Reads a big-endian f64.
    pub fn read_f64_be(&mut self, buffer: &[u8]) -> Result<f64, CodecError> {
        let b = self
            .read(buffer, 8)
            .map_err(|_| CodecError::Decode("unexpected end of AMF data".to_string()))?;
        Ok(BigEndian::read_f64(b))
    }

    /// Reads `n` raw bytes and copies them into an owned `Vec<u8>`.
    pub fn read_vec(&mut self, buffer: &[u8], n: usize) -> Result<Vec<u8>, CodecError> {
        let b = self
            .read(buffer, n)
            .map_err(|_| CodecError::Decode("unexpected end of AMF data".to_string()))?;
        Ok(b.to_vec())
    }

    /// Reads an AMF0 UTF-8 string body of `len` bytes.
    pub fn read_utf8(&mut self, buffer: &[u8], len: usize) -> Result<String, CodecError> {
        let b = self
            .read(buffer, len)
            .map_err(|_| CodecError::Decode("unexpected end of AMF data".to_string()))?;
        String::from_utf8(b.to_vec())
            .map_err(|e| CodecError::Decode(format!("invalid utf-8 in AMF string: {e}")))
    }
}
