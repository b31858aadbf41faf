//! Per-connection limits.

use serde::Deserialize;

use crate::spdy_codec::MAX_FRAME_LENGTH;

/// Default cap on a single frame's declared length (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 1 << 20;

/// Default cap on a decompressed header block (256 KiB).
pub const DEFAULT_MAX_HEADER_BLOCK_SIZE: usize = 256 * 1024;

/// Default number of closed streams kept for duplicate-frame detection.
pub const DEFAULT_CLOSED_STREAM_RETENTION: usize = 64;

/// Default zlib level for outbound header blocks.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Limits applied to one connection.
///
/// Deserializable so it can live in the host application's config file;
/// missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Largest frame length accepted on input, and the chunk size used when
    /// splitting outbound data.
    pub max_frame_size: u32,
    /// Largest decompressed header block accepted on input.
    pub max_header_block_size: usize,
    /// How many closed streams are remembered before the oldest is evicted.
    pub closed_stream_retention: usize,
    /// zlib compression level (0-9) for outbound header blocks.
    pub compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_block_size: DEFAULT_MAX_HEADER_BLOCK_SIZE,
            closed_stream_retention: DEFAULT_CLOSED_STREAM_RETENTION,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl Config {
    /// Bring out-of-range values back into what the wire format allows.
    pub fn normalized(mut self) -> Self {
        if self.max_frame_size > MAX_FRAME_LENGTH {
            tracing::warn!(
                requested = self.max_frame_size,
                max = MAX_FRAME_LENGTH,
                "max_frame_size exceeds the 24-bit length field, clamping"
            );
            self.max_frame_size = MAX_FRAME_LENGTH;
        }
        if self.max_frame_size == 0 {
            tracing::warn!("max_frame_size of 0 would forbid every payload, using default");
            self.max_frame_size = DEFAULT_MAX_FRAME_SIZE;
        }
        if self.compression_level > 9 {
            tracing::warn!(requested = self.compression_level, "compression_level above 9, clamping");
            self.compression_level = 9;
        }
        self
    }
}
