//! CBOR-subset binary values.
//!
//! Entry documents and the container body are self-describing CBOR
//! documents.  Only the subset the vault actually writes is modeled:
//! unsigned integers, byte strings, text strings, arrays, maps, booleans
//! and null, all with definite lengths.  Anything else that is
//! well-formed (negative integers, floats, tags, simple values) decodes
//! to `Value::Unknown` so the typed layer above can contain it instead
//! of failing the whole document.
//!
//! Maps are kept as ordered pair lists.  Entry field order survives a
//! round-trip because of this.

use crate::errors::{DerivaultError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum nesting depth accepted while decoding.
const MAX_DEPTH: usize = 32;

// Major types of the wire format.
const MAJOR_UINT: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A decoded binary value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uint(u64),
    Bytes(Vec<u8>),
    Text(String),
    /// Ordered element list.
    Array(Vec<Value>),
    /// Ordered key/value pairs; insertion order is preserved.
    Map(Vec<(Value, Value)>),
    Bool(bool),
    Null,
    /// A well-formed item this subset does not model.  Encodes as null;
    /// it never appears on the typed encode path.
    Unknown,
}

impl Value {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Look up a text key in a map value.  First match wins.
    pub fn map_get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a value to a fresh byte buffer.  Total: never fails.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

/// Encode a value, appending to `out`.
pub fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Uint(n) => write_head(MAJOR_UINT, *n, out),
        Value::Bytes(b) => {
            write_head(MAJOR_BYTES, b.len() as u64, out);
            out.extend_from_slice(b);
        }
        Value::Text(s) => {
            write_head(MAJOR_TEXT, s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            write_head(MAJOR_ARRAY, items.len() as u64, out);
            for item in items {
                encode_into(item, out);
            }
        }
        Value::Map(pairs) => {
            write_head(MAJOR_MAP, pairs.len() as u64, out);
            for (k, v) in pairs {
                encode_into(k, out);
                encode_into(v, out);
            }
        }
        Value::Bool(false) => out.push(0xf4),
        Value::Bool(true) => out.push(0xf5),
        Value::Null | Value::Unknown => out.push(0xf6),
    }
}

/// Write a head byte plus the shortest argument encoding for `n`.
fn write_head(major: u8, n: u64, out: &mut Vec<u8>) {
    let m = major << 5;
    if n < 24 {
        out.push(m | n as u8);
    } else if n <= u8::MAX as u64 {
        out.push(m | 24);
        out.push(n as u8);
    } else if n <= u16::MAX as u64 {
        out.push(m | 25);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        out.push(m | 26);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.push(m | 27);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode the first value in `data`.
///
/// Trailing bytes after the root item are tolerated (a document is one
/// root value; what follows is someone else's business).
pub fn decode_value(data: &[u8]) -> Result<Value> {
    let mut reader = Reader { data, pos: 0 };
    reader.read_value(0)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(truncated(self.data.len()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read the argument that follows a head byte (length or value).
    fn read_arg(&mut self, info: u8) -> Result<u64> {
        match info {
            0..=23 => Ok(info as u64),
            24 => Ok(self.byte()? as u64),
            25 => {
                let b: [u8; 2] = self.take(2)?.try_into().map_err(|_| truncated(self.pos))?;
                Ok(u16::from_be_bytes(b) as u64)
            }
            26 => {
                let b: [u8; 4] = self.take(4)?.try_into().map_err(|_| truncated(self.pos))?;
                Ok(u32::from_be_bytes(b) as u64)
            }
            27 => {
                let b: [u8; 8] = self.take(8)?.try_into().map_err(|_| truncated(self.pos))?;
                Ok(u64::from_be_bytes(b))
            }
            28..=30 => Err(DerivaultError::Codec(format!(
                "reserved length encoding {info}"
            ))),
            _ => Err(DerivaultError::Codec(
                "indefinite-length items are not supported".into(),
            )),
        }
    }

    /// Convert a declared element count to usize, requiring at least
    /// `min_bytes_each` bytes of input per element.  Rejects counts the
    /// input cannot possibly satisfy before anything is allocated.
    fn checked_count(&self, n: u64, min_bytes_each: usize) -> Result<usize> {
        let count = usize::try_from(n)
            .map_err(|_| DerivaultError::Codec(format!("length {n} exceeds address space")))?;
        if count > self.remaining() / min_bytes_each {
            return Err(DerivaultError::Codec(format!(
                "declared length {count} exceeds remaining input"
            )));
        }
        Ok(count)
    }

    fn read_value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(DerivaultError::Codec("nesting too deep".into()));
        }

        let head = self.byte()?;
        let major = head >> 5;
        let info = head & 0x1f;

        match major {
            MAJOR_UINT => Ok(Value::Uint(self.read_arg(info)?)),
            MAJOR_NEGATIVE => {
                // Consumed for framing, not modeled.
                self.read_arg(info)?;
                Ok(Value::Unknown)
            }
            MAJOR_BYTES => {
                let len = self.read_arg(info)?;
                let count = self.checked_count(len, 1)?;
                Ok(Value::Bytes(self.take(count)?.to_vec()))
            }
            MAJOR_TEXT => {
                let len = self.read_arg(info)?;
                let count = self.checked_count(len, 1)?;
                let bytes = self.take(count)?;
                // A text item that is not valid UTF-8 stays on the wire
                // as Unknown rather than aborting the document.
                match std::str::from_utf8(bytes) {
                    Ok(s) => Ok(Value::Text(s.to_string())),
                    Err(_) => Ok(Value::Unknown),
                }
            }
            MAJOR_ARRAY => {
                let len = self.read_arg(info)?;
                let count = self.checked_count(len, 1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            MAJOR_MAP => {
                let len = self.read_arg(info)?;
                let count = self.checked_count(len, 2)?;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let k = self.read_value(depth + 1)?;
                    let v = self.read_value(depth + 1)?;
                    pairs.push((k, v));
                }
                Ok(Value::Map(pairs))
            }
            MAJOR_TAG => {
                // Tags are hints; skip to the tagged item.
                self.read_arg(info)?;
                self.read_value(depth + 1)
            }
            MAJOR_SIMPLE => self.read_simple(info),
            _ => unreachable!("major is a 3-bit field"),
        }
    }

    fn read_simple(&mut self, info: u8) -> Result<Value> {
        match info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            // Unassigned/undefined simple values.
            0..=19 | 23 => Ok(Value::Unknown),
            24 => {
                self.byte()?;
                Ok(Value::Unknown)
            }
            // Half, single and double precision floats: consumed, unmodeled.
            25 => {
                self.take(2)?;
                Ok(Value::Unknown)
            }
            26 => {
                self.take(4)?;
                Ok(Value::Unknown)
            }
            27 => {
                self.take(8)?;
                Ok(Value::Unknown)
            }
            _ => Err(DerivaultError::Codec(format!(
                "malformed simple value {info}"
            ))),
        }
    }
}

fn truncated(at: usize) -> DerivaultError {
    DerivaultError::Codec(format!("truncated input at byte {at}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
