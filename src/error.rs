//! Error taxonomy for the SPDY engine.
//!
//! "Need more data" is not an error: the frame codec reports it through
//! [`Decoded::NeedMoreData`](crate::spdy_codec::Decoded::NeedMoreData).

/// Errors produced by the SPDY engine.
///
/// The first three variants are connection-fatal: once the frame stream or
/// the shared zlib dictionary is out of step there is nothing to recover.
/// The rest are reported to the call site and leave the connection usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpdyError {
    /// The byte stream does not contain a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A header block could not be compressed or decompressed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The peer broke a stream id, parity or association rule.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The caller referenced a stream that is closed or never existed.
    #[error("unknown stream {0}")]
    UnknownStream(u32),

    /// A header name, value or pair count does not fit the 16-bit length
    /// fields of a SPDY/2 header block.
    #[error("header block too large: {0}")]
    HeaderBlockTooLarge(String),

    /// The caller broke the reply ordering on a stream: a second SYN_REPLY,
    /// a SYN_REPLY on a pushed stream, or data before the reply.
    #[error("stream {stream_id}: {reason}")]
    InvalidStreamState { stream_id: u32, reason: &'static str },

    /// The connection already failed (or was reset) and accepts no more calls.
    #[error("connection closed")]
    ConnectionClosed,
}

impl SpdyError {
    /// Whether this error terminates the whole connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SpdyError::MalformedFrame(_) | SpdyError::Compression(_) | SpdyError::ProtocolViolation(_)
        )
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SpdyError>;
