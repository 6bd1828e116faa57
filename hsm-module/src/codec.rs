//! Word-aligned binary codec spoken by the signing module.
//!
//! Integers are little-endian. Byte strings carry a 4-byte length prefix
//! and are zero-padded up to the next 4-byte boundary; the padding is not
//! counted in the declared length. Text is a byte string holding the UTF-8
//! bytes followed by a single NUL.
//!
//! ```text
//! ┌──────────────┬─────────────────────┬──────────────┐
//! │ len: i32 LE  │ len raw bytes       │ 0..=3 zeroes │
//! └──────────────┴─────────────────────┴──────────────┘
//! ```

use thiserror::Error;

/// Alignment unit of every encoded byte string.
pub const WORD_SIZE: usize = 4;

/// Errors raised while encoding or decoding module values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput { needed: usize, available: usize },

    #[error("malformed text: {0}")]
    MalformedText(&'static str),

    #[error("negative byte string length: {0}")]
    NegativeLength(i32),

    #[error("byte string of {0} bytes does not fit a 32-bit length field")]
    TooLong(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Number of zero bytes needed after `len` bytes to reach a word boundary.
pub fn padding_for(len: usize) -> usize {
    (WORD_SIZE - len % WORD_SIZE) % WORD_SIZE
}

/// A single value the module understands.
///
/// The set is closed: anything the module cannot parse has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Bytes(&'a [u8]),
    Int32(i32),
    Int64(i64),
    Text(&'a str),
}

impl<'a> From<&'a [u8]> for Value<'a> {
    fn from(b: &'a [u8]) -> Self {
        Value::Bytes(b)
    }
}

impl<'a> From<&'a Vec<u8>> for Value<'a> {
    fn from(b: &'a Vec<u8>) -> Self {
        Value::Bytes(b.as_slice())
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Text(s)
    }
}

impl From<i32> for Value<'_> {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value<'_> {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

/// Appends encoded values to an owned buffer.
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Four bytes, little-endian.
    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Eight bytes, little-endian.
    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Length prefix, raw bytes, then zero padding to the word boundary.
    pub fn put_bytes(&mut self, b: &[u8]) -> Result<&mut Self> {
        self.put_byte_string(b, false)
    }

    /// UTF-8 bytes plus a trailing NUL, encoded as a byte string.
    pub fn put_text(&mut self, s: &str) -> Result<&mut Self> {
        self.put_byte_string(s.as_bytes(), true)
    }

    /// Encodes any [`Value`] by its variant.
    pub fn put(&mut self, value: &Value<'_>) -> Result<&mut Self> {
        match *value {
            Value::Bytes(b) => self.put_bytes(b),
            Value::Int32(v) => Ok(self.put_i32(v)),
            Value::Int64(v) => Ok(self.put_i64(v)),
            Value::Text(s) => self.put_text(s),
        }
    }

    fn put_byte_string(&mut self, b: &[u8], nul_terminated: bool) -> Result<&mut Self> {
        let len = b.len() + usize::from(nul_terminated);
        let declared = i32::try_from(len).map_err(|_| CodecError::TooLong(len))?;

        self.buf.reserve(WORD_SIZE + len + padding_for(len));
        self.put_i32(declared);
        self.buf.extend_from_slice(b);
        if nul_terminated {
            self.buf.push(0);
        }
        self.buf.resize(self.buf.len() + padding_for(len), 0);
        Ok(self)
    }

    /// Bytes written so far, padding included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the encoder and returns the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

pub fn encode_i32(v: i32) -> [u8; 4] {
    v.to_le_bytes()
}

pub fn encode_i64(v: i64) -> [u8; 8] {
    v.to_le_bytes()
}

pub fn encode_bytes(b: &[u8]) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.put_bytes(b)?;
    Ok(enc.into_bytes())
}

pub fn encode_text(s: &str) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    enc.put_text(s)?;
    Ok(enc.into_bytes())
}

/// Encodes `values` in order and concatenates the results.
pub fn encode_all(values: &[Value<'_>]) -> Result<Vec<u8>> {
    let mut enc = Encoder::new();
    for value in values {
        enc.put(value)?;
    }
    Ok(enc.into_bytes())
}

/// Typed output slot for [`Decoder::decode_into`].
#[derive(Debug)]
pub enum Slot<'a> {
    Bytes(&'a mut Vec<u8>),
    Int32(&'a mut i32),
    Int64(&'a mut i64),
    Text(&'a mut String),
}

/// Cursor over an encoded buffer.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Undecoded tail of the buffer.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// True once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let available = self.buf.len() - self.pos;
        if n > available {
            return Err(CodecError::TruncatedInput {
                needed: n,
                available,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Advances past `n` bytes without reading them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Reads four little-endian bytes.
    pub fn get_i32(&mut self) -> Result<i32> {
        let raw = self.take(4)?;
        Ok(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    /// Reads eight little-endian bytes.
    pub fn get_i64(&mut self) -> Result<i64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(word))
    }

    /// Reads one byte string and discards its padding.
    pub fn get_bytes(&mut self) -> Result<&'a [u8]> {
        let declared = self.get_i32()?;
        let len = usize::try_from(declared).map_err(|_| CodecError::NegativeLength(declared))?;
        let data = self.take(len)?;
        self.skip(padding_for(len))?;
        Ok(data)
    }

    /// Reads one byte string that must end in a NUL and strips it.
    pub fn get_text(&mut self) -> Result<String> {
        let raw = self.get_bytes()?;
        let (nul, text) = raw
            .split_last()
            .ok_or(CodecError::MalformedText("missing NUL terminator"))?;
        if *nul != 0 {
            return Err(CodecError::MalformedText("missing NUL terminator"));
        }
        String::from_utf8(text.to_vec()).map_err(|_| CodecError::MalformedText("invalid UTF-8"))
    }

    /// Decodes one value per slot, in order.
    ///
    /// Stops at the first failure; that slot and every later one keep
    /// their previous contents.
    pub fn decode_into(&mut self, slots: &mut [Slot<'_>]) -> Result<()> {
        for slot in slots.iter_mut() {
            match slot {
                Slot::Bytes(out) => **out = self.get_bytes()?.to_vec(),
                Slot::Int32(out) => **out = self.get_i32()?,
                Slot::Int64(out) => **out = self.get_i64()?,
                Slot::Text(out) => **out = self.get_text()?,
            }
        }
        Ok(())
    }
}

/// Returns the value and the number of bytes it occupied.
pub fn decode_i32(input: &[u8]) -> Result<(i32, usize)> {
    let mut dec = Decoder::new(input);
    let v = dec.get_i32()?;
    Ok((v, dec.position()))
}

pub fn decode_i64(input: &[u8]) -> Result<(i64, usize)> {
    let mut dec = Decoder::new(input);
    let v = dec.get_i64()?;
    Ok((v, dec.position()))
}

pub fn decode_bytes(input: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut dec = Decoder::new(input);
    let v = dec.get_bytes()?.to_vec();
    Ok((v, dec.position()))
}

pub fn decode_text(input: &[u8]) -> Result<(String, usize)> {
    let mut dec = Decoder::new(input);
    let v = dec.get_text()?;
    Ok((v, dec.position()))
}

/// Decodes `input` into `slots` and returns the number of bytes consumed.
pub fn decode_all(input: &[u8], slots: &mut [Slot<'_>]) -> Result<usize> {
    let mut dec = Decoder::new(input);
    dec.decode_into(slots)?;
    Ok(dec.position())
}
