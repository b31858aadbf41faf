//! spdy-sans-io: A minimal, sans-I/O SPDY/2 server engine
//!
//! This crate provides the protocol core of a SPDY server: frame parsing and
//! encoding, the connection-wide zlib header compression session, stream id
//! bookkeeping and server push. It performs no I/O of its own.
//!
//! # Features
//!
//! - **Sans-I/O Design**: bytes in, events and bytes out; no async runtime
//! - **SPDY/2 Wire Format**: SYN_STREAM, SYN_REPLY, RST_STREAM, SETTINGS,
//!   NOOP, PING, GOAWAY, HEADERS and DATA frames
//! - **Header Compression**: zlib with the SPDY/2 dictionary via flate2
//! - **Server Push**: even-numbered unidirectional streams tied to a request
//! - **Bounded Memory**: frame size, header block size and closed-stream
//!   retention are all capped
//!
//! # Quick Start
//!
//! ```rust
//! use spdy_sans_io::{Headers, SpdyEvent, SpdyServer};
//!
//! let mut server = SpdyServer::new();
//!
//! # let mut client = spdy_sans_io::CompressionSession::default();
//! # let request: Headers = [("url", "/")].into_iter().collect();
//! # let received = spdy_sans_io::Frame::SynStream {
//! #     stream_id: 1, associated_id: 0, priority: 0, flags: spdy_sans_io::flags::FIN,
//! #     header_block: client.compress_headers(&request).unwrap(),
//! # }.encode();
//! // Feed decrypted bytes from the transport and react to events.
//! for event in server.on_bytes_received(&received) {
//!     if let SpdyEvent::RequestHeadersReceived { stream_id, .. } = event {
//!         let reply: Headers = [("status", "200 OK"), ("version", "HTTP/1.1")].into_iter().collect();
//!         let mut out = server.send_reply(stream_id, &reply, false).unwrap();
//!         out.extend(server.send_data(stream_id, b"Hello, World!", true).unwrap());
//!         // write `out` to the transport
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`spdy_codec`]: frames to and from bytes (pure)
//! - [`zlib`]: the per-connection compression session
//! - [`stream`]: the per-connection stream table
//! - [`server`]: the engine tying them together
//!
//! It does NOT provide:
//! - TCP transport (you provide the bytes)
//! - TLS or NPN (terminate TLS before calling the engine)
//! - HTTP semantics beyond header mappings

pub mod config;
pub mod error;
pub mod headers;
pub mod server;
pub mod spdy_codec;
pub mod stream;
pub mod zlib;

pub use config::Config;
pub use error::{Result, SpdyError};
pub use headers::{Header, Headers};
pub use server::{SpdyEvent, SpdyServer};
pub use spdy_codec::{
    flags, frame_type, status_code, Decoded, Frame, FrameHeader, Setting, FRAME_HEADER_SIZE,
    MAX_FRAME_LENGTH, SPDY_VERSION,
};
pub use stream::{Side, Stream, StreamState, StreamTable};
pub use zlib::{CompressionSession, DICTIONARY};
