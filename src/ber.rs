// BER primitive layer: a forward-only streaming reader, an append-only
// writer, and a materialized element tree. Definite lengths only (short and
// long form); indefinite length is a decode error.

use crate::error::{DecodeError, Result};

pub const TAG_ENUMERATED: u8 = 0x0A;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_SEQUENCE: u8 = 0x30;

/// Minimal two's-complement encoding of a signed integer value.
pub(crate) fn int_to_bytes(value: i32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 3 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

pub(crate) fn int_from_bytes(bytes: &[u8]) -> Result<i32> {
    if bytes.is_empty() || bytes.len() > 4 {
        return Err(DecodeError::Malformed(format!(
            "integer value must be 1-4 bytes, got {}",
            bytes.len()
        )));
    }
    let mut value: i32 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | b as i32;
    }
    Ok(value)
}

fn encode_length(out: &mut Vec<u8>, length: usize) {
    if length < 128 {
        out.push(length as u8);
    } else {
        let mut bytes = Vec::new();
        let mut len = length;
        while len > 0 {
            bytes.push((len & 0xFF) as u8);
            len >>= 8;
        }
        bytes.reverse();
        out.push(0x80 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }
}

/// Forward-only cursor over a BER-encoded buffer.
///
/// Exclusively owned by one decode call; never shared. `peek_tag` looks at
/// the next element's tag without consuming it, which is how trailing
/// optional elements get classified before a typed read.
pub struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn peek_tag(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(DecodeError::Truncated {
            needed: 1,
            remaining: 0,
        })
    }

    pub fn read_tag(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_length(&mut self) -> Result<usize> {
        let first = self.take(1)?[0];
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let count = (first & 0x7F) as usize;
        if count == 0 {
            return Err(DecodeError::Malformed(
                "indefinite length not supported".into(),
            ));
        }
        if count > 4 {
            return Err(DecodeError::Malformed(format!(
                "length encoding too large: {} bytes",
                count
            )));
        }
        let mut length = 0usize;
        for &b in self.take(count)? {
            length = (length << 8) | b as usize;
        }
        Ok(length)
    }

    pub fn read_enumerated(&mut self) -> Result<i32> {
        let tag = self.read_tag()?;
        if tag != TAG_ENUMERATED {
            return Err(DecodeError::TagMismatch {
                expected: TAG_ENUMERATED,
                tag,
            });
        }
        let length = self.read_length()?;
        int_from_bytes(self.take(length)?)
    }

    /// Read only length + value (tag already consumed). Use after peek/read
    /// of a context-specific tag.
    pub fn read_octet_string_value(&mut self) -> Result<Vec<u8>> {
        let length = self.read_length()?;
        Ok(self.take(length)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String> {
        let tag = self.read_tag()?;
        if tag != TAG_OCTET_STRING {
            return Err(DecodeError::TagMismatch {
                expected: TAG_OCTET_STRING,
                tag,
            });
        }
        Ok(String::from_utf8(self.read_octet_string_value()?)?)
    }

    /// Consume the tag and length of a constructed element, checking the tag
    /// against `expected`. Returns the end offset of the sequence content so
    /// the caller can test `position() < end` for remaining elements.
    pub fn begin_sequence(&mut self, expected: u8) -> Result<usize> {
        let tag = self.read_tag()?;
        if tag != expected {
            return Err(DecodeError::TagMismatch { expected, tag });
        }
        let length = self.read_length()?;
        let end = self.pos + length;
        if end > self.data.len() {
            return Err(DecodeError::Truncated {
                needed: length,
                remaining: self.remaining(),
            });
        }
        Ok(end)
    }
}

/// Append-only BER output buffer.
pub struct BerWriter {
    buffer: Vec<u8>,
}

impl Default for BerWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BerWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn write_raw(&mut self, tag: u8, value: &[u8]) {
        self.buffer.push(tag);
        encode_length(&mut self.buffer, value.len());
        self.buffer.extend_from_slice(value);
    }

    pub fn write_enumerated(&mut self, value: i32) {
        let bytes = int_to_bytes(value);
        self.write_raw(TAG_ENUMERATED, &bytes);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_raw(TAG_OCTET_STRING, s.as_bytes());
    }

    /// Write the tag and a length placeholder; returns the placeholder
    /// position for `end_sequence`.
    pub fn begin_sequence(&mut self, tag: u8) -> usize {
        self.buffer.push(tag);
        let pos = self.buffer.len();
        self.buffer.push(0);
        pos
    }

    /// Back-patch the length at `pos` for content written since
    /// `begin_sequence`. Short and long form.
    pub fn end_sequence(&mut self, pos: usize) {
        let content_len = self.buffer.len() - (pos + 1);
        if content_len < 128 {
            self.buffer[pos] = content_len as u8;
        } else {
            let mut bytes = Vec::new();
            let mut len = content_len;
            while len > 0 {
                bytes.push((len & 0xFF) as u8);
                len >>= 8;
            }
            bytes.reverse();
            self.buffer[pos] = 0x80 | bytes.len() as u8;
            for (i, b) in bytes.iter().enumerate() {
                self.buffer.insert(pos + 1 + i, *b);
            }
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }
}

/// A materialized TLV: tag plus raw value bytes. Constructed elements keep
/// their content encoded; `children()` splits it into sub-elements for
/// random-access decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BerElement {
    tag: u8,
    value: Vec<u8>,
}

impl BerElement {
    pub fn new(tag: u8, value: Vec<u8>) -> Self {
        Self { tag, value }
    }

    pub fn enumerated(value: i32) -> Self {
        Self::new(TAG_ENUMERATED, int_to_bytes(value))
    }

    pub fn octet_string(s: &str) -> Self {
        Self::new(TAG_OCTET_STRING, s.as_bytes().to_vec())
    }

    pub fn sequence(tag: u8, elements: &[BerElement]) -> Self {
        let mut value = Vec::new();
        for element in elements {
            element.encode_into(&mut value);
        }
        Self::new(tag, value)
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Vec<u8> {
        self.value
    }

    pub fn int_value(&self) -> Result<i32> {
        int_from_bytes(&self.value)
    }

    pub fn string_value(&self) -> Result<String> {
        Ok(String::from_utf8(self.value.clone())?)
    }

    /// Parse exactly one element spanning the whole buffer.
    pub fn parse(data: &[u8]) -> Result<BerElement> {
        let mut reader = BerReader::new(data);
        let element = Self::read_one(&mut reader)?;
        if reader.remaining() > 0 {
            return Err(DecodeError::Malformed(format!(
                "{} trailing bytes after element",
                reader.remaining()
            )));
        }
        Ok(element)
    }

    fn read_one(reader: &mut BerReader<'_>) -> Result<BerElement> {
        let tag = reader.read_tag()?;
        let value = reader.read_octet_string_value()?;
        Ok(BerElement { tag, value })
    }

    /// Split a constructed element's value into its child elements.
    pub fn children(&self) -> Result<Vec<BerElement>> {
        let mut reader = BerReader::new(&self.value);
        let mut children = Vec::new();
        while reader.remaining() > 0 {
            children.push(Self::read_one(&mut reader)?);
        }
        Ok(children)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.tag);
        encode_length(out, self.value.len());
        out.extend_from_slice(&self.value);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.value.len() + 6);
        self.encode_into(&mut out);
        out
    }
}
