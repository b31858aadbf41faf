//! Header mappings and the SPDY/2 name/value block.
//!
//! Uncompressed layout (all lengths big-endian):
//!
//! ```text
//! +------------------------------------+
//! | Number of Name/Value pairs (16)    |
//! +------------------------------------+
//! | Length of name (16)  | Name ...    |
//! +------------------------------------+
//! | Length of value (16) | Value ...   |
//! +------------------------------------+
//! |           (repeats)                |
//! ```

use crate::error::{Result, SpdyError};

/// A single decoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Header mapping with case-insensitive names.
///
/// Names are stored lowercased (SPDY requires it on the wire). Insertion
/// order is kept; when a name repeats the first value wins. Names and values
/// must be UTF-8; a received block carrying other bytes is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header. Returns `false` (and keeps the existing value) if
    /// the name is already present.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into().to_ascii_lowercase();
        if self.contains(&name) {
            return false;
        }
        self.entries.push(Header::new(name, value));
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    /// Serialize into an uncompressed name/value block.
    pub fn to_block(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.entries.len()).map_err(|_| {
            SpdyError::HeaderBlockTooLarge(format!("{} pairs, max {}", self.entries.len(), u16::MAX))
        })?;

        let mut block = Vec::with_capacity(2 + self.entries.iter().map(|h| 4 + h.name.len() + h.value.len()).sum::<usize>());
        block.extend_from_slice(&count.to_be_bytes());
        for header in &self.entries {
            put_string(&mut block, &header.name)?;
            put_string(&mut block, &header.value)?;
        }
        Ok(block)
    }

    /// Parse an uncompressed name/value block.
    ///
    /// Any framing problem is reported as a compression error: the block came
    /// out of the shared inflater, so a bad block means the dictionary state
    /// can no longer be trusted.
    pub fn from_block(block: &[u8]) -> Result<Self> {
        let mut reader = BlockReader { block, pos: 0 };
        let count = reader.read_u16()?;
        let mut headers = Headers::new();
        for _ in 0..count {
            let name = reader.read_string()?;
            let value = reader.read_string()?;
            if name.is_empty() {
                return Err(SpdyError::Compression("empty header name".to_string()));
            }
            if !headers.insert(name.clone(), value) {
                tracing::debug!(name = %name, "duplicate header name, keeping first value");
            }
        }
        if reader.pos != block.len() {
            return Err(SpdyError::Compression(format!(
                "{} trailing bytes after header block",
                block.len() - reader.pos
            )));
        }
        Ok(headers)
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn put_string(block: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| SpdyError::HeaderBlockTooLarge(format!("{} byte string, max {}", s.len(), u16::MAX)))?;
    block.extend_from_slice(&len.to_be_bytes());
    block.extend_from_slice(s.as_bytes());
    Ok(())
}

struct BlockReader<'a> {
    block: &'a [u8],
    pos: usize,
}

impl BlockReader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self.pos + n;
        if end > self.block.len() {
            return Err(SpdyError::Compression(format!(
                "header block truncated at byte {} (need {} more)",
                self.pos,
                end - self.block.len()
            )));
        }
        let bytes = &self.block[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let start = self.pos;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| SpdyError::Compression(format!("header string at byte {} is not valid UTF-8", start)))
    }
}
