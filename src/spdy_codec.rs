//! SPDY/2 frame codec.
//!
//! Pure transform between byte buffers and [`Frame`] values. Decoding is
//! resumable: a partial frame yields [`Decoded::NeedMoreData`] and nothing is
//! consumed, so the caller can append more bytes and try again.
//!
//! ```text
//! Control frame                       Data frame
//! +-+--------------+-----------+      +-+------------------------+
//! |1| Version (15) | Type (16) |      |0|   Stream-ID (31)       |
//! +-+--------------+-----------+      +-+------------------------+
//! | Flags (8) |  Length (24)   |      | Flags (8) |  Length (24) |
//! +-----------+----------------+      +-----------+--------------+
//! |          Body ...          |      |        Payload ...       |
//! ```
//!
//! Header blocks inside control frames are carried compressed; this module
//! never touches the zlib session.

use crate::error::{Result, SpdyError};

/// Protocol version carried in every control frame.
pub const SPDY_VERSION: u16 = 2;

/// Size of the common frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest value the 24-bit length field can carry.
pub const MAX_FRAME_LENGTH: u32 = 0x00FF_FFFF;

/// Mask for 31-bit stream ids (top bit reserved).
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

const CONTROL_BIT: u8 = 0x80;

/// SPDY/2 control frame types
pub mod frame_type {
    pub const SYN_STREAM: u16 = 1;
    pub const SYN_REPLY: u16 = 2;
    pub const RST_STREAM: u16 = 3;
    pub const SETTINGS: u16 = 4;
    pub const NOOP: u16 = 5;
    pub const PING: u16 = 6;
    pub const GOAWAY: u16 = 7;
    pub const HEADERS: u16 = 8;
}

/// Frame flags
pub mod flags {
    /// Last frame from this sender on the stream.
    pub const FIN: u8 = 0x01;
    /// SYN_STREAM only: the recipient will not send on this stream.
    pub const UNIDIRECTIONAL: u8 = 0x02;
    /// SETTINGS only: drop previously persisted settings.
    pub const CLEAR_PERSISTED_SETTINGS: u8 = 0x01;
}

/// RST_STREAM status codes
pub mod status_code {
    pub const PROTOCOL_ERROR: u32 = 1;
    pub const INVALID_STREAM: u32 = 2;
    pub const REFUSED_STREAM: u32 = 3;
    pub const UNSUPPORTED_VERSION: u32 = 4;
    pub const CANCEL: u32 = 5;
    pub const INTERNAL_ERROR: u32 = 6;
    pub const FLOW_CONTROL_ERROR: u32 = 7;
}

/// The common 8-byte header, before the body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    Control {
        version: u16,
        frame_type: u16,
        flags: u8,
        length: u32,
    },
    Data {
        stream_id: u32,
        flags: u8,
        length: u32,
    },
}

impl FrameHeader {
    /// Parse the 8-byte header, or `None` if fewer bytes are available.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let flags = data[4];
        let length = read_u24(&data[5..8]);
        if data[0] & CONTROL_BIT != 0 {
            let version = u16::from_be_bytes([data[0] & !CONTROL_BIT, data[1]]);
            let frame_type = u16::from_be_bytes([data[2], data[3]]);
            Some(FrameHeader::Control { version, frame_type, flags, length })
        } else {
            let stream_id = read_u31(&data[0..4]);
            Some(FrameHeader::Data { stream_id, flags, length })
        }
    }

    pub fn length(&self) -> u32 {
        match *self {
            FrameHeader::Control { length, .. } | FrameHeader::Data { length, .. } => length,
        }
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.length() as usize
    }
}

/// One SETTINGS entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u32,
    pub flags: u8,
    pub value: u32,
}

/// A SPDY/2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Opens a stream. Sent by clients for requests and by servers for pushes.
    SynStream {
        stream_id: u32,
        associated_id: u32,
        /// 0 (highest) to 3 (lowest).
        priority: u8,
        flags: u8,
        header_block: Vec<u8>,
    },
    /// Response headers for a client-initiated stream.
    SynReply {
        stream_id: u32,
        flags: u8,
        header_block: Vec<u8>,
    },
    RstStream {
        stream_id: u32,
        status: u32,
    },
    Settings {
        flags: u8,
        entries: Vec<Setting>,
    },
    Noop,
    Ping {
        id: u32,
    },
    GoAway {
        last_good_stream_id: u32,
    },
    /// Additional headers on an open stream.
    Headers {
        stream_id: u32,
        flags: u8,
        header_block: Vec<u8>,
    },
    Data {
        stream_id: u32,
        flags: u8,
        payload: Vec<u8>,
    },
}

/// Outcome of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame and the number of bytes it occupied.
    Frame(Frame, usize),
    /// The buffer holds less than one full frame; nothing was consumed.
    NeedMoreData,
}

impl Frame {
    /// Decode one frame from the front of `buf`.
    pub fn decode(buf: &[u8], max_frame_size: u32) -> Result<Decoded> {
        let header = match FrameHeader::parse(buf) {
            Some(h) => h,
            None => return Ok(Decoded::NeedMoreData),
        };

        // Check the limit before waiting for the body so an oversized frame
        // is rejected without buffering it.
        if header.length() > max_frame_size {
            return Err(SpdyError::MalformedFrame(format!(
                "frame length {} exceeds maximum {}",
                header.length(),
                max_frame_size
            )));
        }
        if let FrameHeader::Data { stream_id: 0, .. } = header {
            return Err(SpdyError::MalformedFrame("data frame on stream 0".to_string()));
        }
        if let FrameHeader::Control { version, .. } = header {
            if version != SPDY_VERSION {
                return Err(SpdyError::MalformedFrame(format!("unsupported version {}", version)));
            }
        }

        let total_size = header.total_size();
        if buf.len() < total_size {
            return Ok(Decoded::NeedMoreData);
        }

        let body = &buf[FRAME_HEADER_SIZE..total_size];
        let frame = match header {
            FrameHeader::Data { stream_id, flags, .. } => Frame::Data {
                stream_id,
                flags,
                payload: body.to_vec(),
            },
            FrameHeader::Control { frame_type, flags, .. } => Self::parse_control(frame_type, flags, body)?,
        };
        Ok(Decoded::Frame(frame, total_size))
    }

    fn parse_control(kind: u16, flags: u8, body: &[u8]) -> Result<Frame> {
        match kind {
            frame_type::SYN_STREAM => {
                require_len("SYN_STREAM", body, 10)?;
                Ok(Frame::SynStream {
                    stream_id: read_u31(&body[0..4]),
                    associated_id: read_u31(&body[4..8]),
                    priority: body[8] >> 6,
                    flags,
                    header_block: body[10..].to_vec(),
                })
            }
            frame_type::SYN_REPLY => {
                require_len("SYN_REPLY", body, 6)?;
                Ok(Frame::SynReply {
                    stream_id: read_u31(&body[0..4]),
                    flags,
                    header_block: body[6..].to_vec(),
                })
            }
            frame_type::RST_STREAM => {
                require_exact_len("RST_STREAM", body, 8)?;
                Ok(Frame::RstStream {
                    stream_id: read_u31(&body[0..4]),
                    status: read_u32(&body[4..8]),
                })
            }
            frame_type::SETTINGS => {
                require_len("SETTINGS", body, 4)?;
                let count = read_u32(&body[0..4]) as usize;
                let entries_len = body.len() - 4;
                if entries_len % 8 != 0 || entries_len / 8 != count {
                    return Err(SpdyError::MalformedFrame(format!(
                        "SETTINGS declares {} entries but carries {} bytes",
                        count, entries_len
                    )));
                }
                let entries = body[4..]
                    .chunks_exact(8)
                    .map(|entry| Setting {
                        id: read_u24(&entry[0..3]),
                        flags: entry[3],
                        value: read_u32(&entry[4..8]),
                    })
                    .collect();
                Ok(Frame::Settings { flags, entries })
            }
            frame_type::NOOP => Ok(Frame::Noop),
            frame_type::PING => {
                require_exact_len("PING", body, 4)?;
                Ok(Frame::Ping { id: read_u32(&body[0..4]) })
            }
            frame_type::GOAWAY => {
                require_exact_len("GOAWAY", body, 4)?;
                Ok(Frame::GoAway {
                    last_good_stream_id: read_u31(&body[0..4]),
                })
            }
            frame_type::HEADERS => {
                require_len("HEADERS", body, 6)?;
                Ok(Frame::Headers {
                    stream_id: read_u31(&body[0..4]),
                    flags,
                    header_block: body[6..].to_vec(),
                })
            }
            other => Err(SpdyError::MalformedFrame(format!("unknown control frame type {}", other))),
        }
    }

    /// Serialize to a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + self.body_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Append the serialized frame to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let length = self.body_len() as u32;
        match self {
            Frame::Data { stream_id, flags, payload } => {
                buf.extend_from_slice(&(stream_id & STREAM_ID_MASK).to_be_bytes());
                push_flags_and_length(buf, *flags, length);
                buf.extend_from_slice(payload);
            }
            Frame::SynStream { stream_id, associated_id, priority, flags, header_block } => {
                push_control_header(buf, frame_type::SYN_STREAM, *flags, length);
                buf.extend_from_slice(&(stream_id & STREAM_ID_MASK).to_be_bytes());
                buf.extend_from_slice(&(associated_id & STREAM_ID_MASK).to_be_bytes());
                buf.push((priority & 0x3) << 6);
                buf.push(0);
                buf.extend_from_slice(header_block);
            }
            Frame::SynReply { stream_id, flags, header_block } => {
                push_control_header(buf, frame_type::SYN_REPLY, *flags, length);
                buf.extend_from_slice(&(stream_id & STREAM_ID_MASK).to_be_bytes());
                buf.extend_from_slice(&[0, 0]);
                buf.extend_from_slice(header_block);
            }
            Frame::RstStream { stream_id, status } => {
                push_control_header(buf, frame_type::RST_STREAM, 0, length);
                buf.extend_from_slice(&(stream_id & STREAM_ID_MASK).to_be_bytes());
                buf.extend_from_slice(&status.to_be_bytes());
            }
            Frame::Settings { flags, entries } => {
                push_control_header(buf, frame_type::SETTINGS, *flags, length);
                buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
                for entry in entries {
                    buf.extend_from_slice(&entry.id.to_be_bytes()[1..]);
                    buf.push(entry.flags);
                    buf.extend_from_slice(&entry.value.to_be_bytes());
                }
            }
            Frame::Noop => push_control_header(buf, frame_type::NOOP, 0, length),
            Frame::Ping { id } => {
                push_control_header(buf, frame_type::PING, 0, length);
                buf.extend_from_slice(&id.to_be_bytes());
            }
            Frame::GoAway { last_good_stream_id } => {
                push_control_header(buf, frame_type::GOAWAY, 0, length);
                buf.extend_from_slice(&(last_good_stream_id & STREAM_ID_MASK).to_be_bytes());
            }
            Frame::Headers { stream_id, flags, header_block } => {
                push_control_header(buf, frame_type::HEADERS, *flags, length);
                buf.extend_from_slice(&(stream_id & STREAM_ID_MASK).to_be_bytes());
                buf.extend_from_slice(&[0, 0]);
                buf.extend_from_slice(header_block);
            }
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Frame::Data { payload, .. } => payload.len(),
            Frame::SynStream { header_block, .. } => 10 + header_block.len(),
            Frame::SynReply { header_block, .. } | Frame::Headers { header_block, .. } => 6 + header_block.len(),
            Frame::RstStream { .. } => 8,
            Frame::Settings { entries, .. } => 4 + 8 * entries.len(),
            Frame::Noop => 0,
            Frame::Ping { .. } | Frame::GoAway { .. } => 4,
        }
    }

    /// Stream this frame belongs to, if it is stream-scoped.
    pub fn stream_id(&self) -> Option<u32> {
        match *self {
            Frame::SynStream { stream_id, .. }
            | Frame::SynReply { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Data { stream_id, .. } => Some(stream_id),
            Frame::Settings { .. } | Frame::Noop | Frame::Ping { .. } | Frame::GoAway { .. } => None,
        }
    }

    pub fn flags(&self) -> u8 {
        match *self {
            Frame::SynStream { flags, .. }
            | Frame::SynReply { flags, .. }
            | Frame::Settings { flags, .. }
            | Frame::Headers { flags, .. }
            | Frame::Data { flags, .. } => flags,
            Frame::RstStream { .. } | Frame::Noop | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }

    /// Check if FIN flag is set
    pub fn is_fin(&self) -> bool {
        match self {
            Frame::Settings { .. } => false,
            _ => self.flags() & flags::FIN != 0,
        }
    }
}

fn require_len(name: &str, body: &[u8], min: usize) -> Result<()> {
    if body.len() < min {
        return Err(SpdyError::MalformedFrame(format!(
            "{} frame too short ({} bytes, need {})",
            name,
            body.len(),
            min
        )));
    }
    Ok(())
}

fn require_exact_len(name: &str, body: &[u8], len: usize) -> Result<()> {
    if body.len() != len {
        return Err(SpdyError::MalformedFrame(format!(
            "{} frame must be {} bytes, got {}",
            name,
            len,
            body.len()
        )));
    }
    Ok(())
}

fn push_control_header(buf: &mut Vec<u8>, kind: u16, flags: u8, length: u32) {
    buf.extend_from_slice(&(SPDY_VERSION | 0x8000).to_be_bytes());
    buf.extend_from_slice(&kind.to_be_bytes());
    push_flags_and_length(buf, flags, length);
}

fn push_flags_and_length(buf: &mut Vec<u8>, flags: u8, length: u32) {
    buf.push(flags);
    buf.push((length >> 16) as u8);
    buf.push((length >> 8) as u8);
    buf.push(length as u8);
}

fn read_u24(b: &[u8]) -> u32 {
    ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32)
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u31(b: &[u8]) -> u32 {
    read_u32(b) & STREAM_ID_MASK
}
