//! zlib header compression for SPDY/2.
//!
//! Thin wrapper around `flate2` holding the per-connection deflate and
//! inflate streams. Both are primed with the SPDY/2 dictionary and keep
//! their window across every header block on the connection, so blocks must
//! be inflated in exactly the order they were deflated.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use crate::error::{Result, SpdyError};
use crate::headers::Headers;

/// The SPDY/2 header compression dictionary, including its trailing NUL.
pub const DICTIONARY: &[u8] = concat!(
    "optionsgetheadpostputdeletetraceacceptaccept-charsetaccept-encodingaccept-",
    "languageauthorizationexpectfromhostif-modified-sinceif-matchif-none-matchi",
    "f-rangeif-unmodifiedsincemax-forwardsproxy-authorizationrangerefererteuser",
    "-agent10010120020120220320420520630030130230330430530630740040140240340440",
    "5406407408409410411412413414415416417500501502503504505accept-rangesageeta",
    "glocationproxy-authenticatepublicretry-afterservervarywarningwww-authentic",
    "ateallowcontent-basecontent-encodingcache-controlconnectiondatetrailertran",
    "sfer-encodingupgradeviawarningcontent-languagecontent-lengthcontent-locati",
    "oncontent-md5content-rangecontent-typeetagexpireslast-modifiedset-cookieMo",
    "ndayTuesdayWednesdayThursdayFridaySaturdaySundayJanFebMarAprMayJunJulAugSe",
    "pOctNovDecchunkedtext/htmlimage/pngimage/jpgimage/gifapplication/xmlapplic",
    "ation/xhtmltext/plainpublicmax-agecharset=iso-8859-1utf-8gzipdeflateHTTP/1",
    ".1statusversionurl\0",
)
.as_bytes();

/// Per-connection compression state: one deflater for blocks we send, one
/// inflater for blocks we receive.
pub struct CompressionSession {
    deflate: Compress,
    inflate: Decompress,
    level: Compression,
    deflate_primed: bool,
    max_header_block_size: usize,
}

impl std::fmt::Debug for CompressionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionSession")
            .field("level", &self.level.level())
            .field("deflated", &self.deflate.total_in())
            .field("inflated", &self.inflate.total_out())
            .finish()
    }
}

impl Default for CompressionSession {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_COMPRESSION_LEVEL,
            crate::config::DEFAULT_MAX_HEADER_BLOCK_SIZE,
        )
    }
}

impl CompressionSession {
    pub fn new(level: u32, max_header_block_size: usize) -> Self {
        let level = Compression::new(level.min(9));
        Self {
            deflate: Compress::new(level, true),
            inflate: Decompress::new(true),
            level,
            deflate_primed: false,
            max_header_block_size,
        }
    }

    /// Compress a header mapping into a block for SYN_STREAM, SYN_REPLY or
    /// HEADERS.
    ///
    /// Each block ends with a sync flush so the peer can inflate it as soon
    /// as the frame arrives.
    pub fn compress_headers(&mut self, headers: &Headers) -> Result<Vec<u8>> {
        // Framing errors surface here, before the deflater sees any input.
        let raw = headers.to_block()?;

        if !self.deflate_primed {
            self.deflate
                .set_dictionary(DICTIONARY)
                .map_err(|e| SpdyError::Compression(format!("deflate dictionary: {}", e)))?;
            self.deflate_primed = true;
        }

        let start = self.deflate.total_in();
        let mut out = Vec::with_capacity(raw.len() + 64);
        loop {
            let consumed = (self.deflate.total_in() - start) as usize;
            self.deflate
                .compress_vec(&raw[consumed..], &mut out, FlushCompress::Sync)
                .map_err(|e| SpdyError::Compression(format!("deflate: {}", e)))?;

            let consumed = (self.deflate.total_in() - start) as usize;
            if consumed == raw.len() && out.len() < out.capacity() {
                break;
            }
            out.reserve(out.capacity().max(64));
        }
        Ok(out)
    }

    /// Inflate a received header block and parse it.
    pub fn decompress_headers(&mut self, block: &[u8]) -> Result<Headers> {
        let raw = self.inflate_block(block)?;
        Headers::from_block(&raw)
    }

    fn inflate_block(&mut self, block: &[u8]) -> Result<Vec<u8>> {
        let start_in = self.inflate.total_in();
        let mut out = Vec::with_capacity((block.len() * 4).max(256));
        loop {
            let consumed_before = (self.inflate.total_in() - start_in) as usize;
            let produced_before = out.len();

            match self.inflate.decompress_vec(&block[consumed_before..], &mut out, FlushDecompress::Sync) {
                Ok(_) => {}
                Err(e) if e.needs_dictionary().is_some() => {
                    self.inflate
                        .set_dictionary(DICTIONARY)
                        .map_err(|e| SpdyError::Compression(format!("inflate dictionary: {}", e)))?;
                    continue;
                }
                Err(e) => return Err(SpdyError::Compression(format!("inflate: {}", e))),
            }

            if out.len() > self.max_header_block_size {
                return Err(SpdyError::Compression(format!(
                    "header block too large ({} bytes, max {})",
                    out.len(),
                    self.max_header_block_size
                )));
            }

            let consumed = (self.inflate.total_in() - start_in) as usize;
            if consumed == block.len() && out.len() < out.capacity() {
                return Ok(out);
            }
            if out.len() == out.capacity() {
                out.reserve(out.capacity());
            } else if consumed == consumed_before && out.len() == produced_before {
                return Err(SpdyError::Compression(format!(
                    "inflate stalled after {} of {} bytes",
                    consumed,
                    block.len()
                )));
            }
        }
    }

    /// Discard all dictionary state. Only for the end of a connection.
    pub fn reset(&mut self) {
        self.deflate.reset();
        self.inflate.reset(true);
        self.deflate_primed = false;
    }
}

// ============================================================================
// Tests
// ============================================================================
