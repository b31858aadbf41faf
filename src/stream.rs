//! Per-connection stream table.
//!
//! Streams live in a map keyed by id. Client-initiated ids are odd and
//! strictly increasing, pushed ids are even and strictly increasing, and no
//! id is used twice on one connection. Closed streams stay in the table for a
//! while so late duplicates can be recognised, then the oldest are evicted.

use std::collections::{HashMap, VecDeque};

use crate::error::{Result, SpdyError};
use crate::headers::Headers;
use crate::spdy_codec::STREAM_ID_MASK;

/// Lifecycle of a stream.
///
/// ```text
///            FIN(remote)                  FIN(local)
///   Open ------------------> HalfClosedRemote ----------> Closed
///     |                                                     ^
///     |      FIN(local)                   FIN(remote)       |
///     +-------------------> HalfClosedLocal ----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    /// We sent FIN; the peer may still send.
    HalfClosedLocal,
    /// The peer sent FIN; we may still send.
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    pub fn can_send(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedRemote)
    }

    pub fn can_recv(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal)
    }
}

/// Which half of a stream a FIN applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Our sending half.
    Local,
    /// The peer's sending half.
    Remote,
}

/// One logical exchange on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: u32,
    /// 0, or the client stream a push belongs to.
    pub associated_id: u32,
    /// 0 (highest) to 3 (lowest). Advisory.
    pub priority: u8,
    pub state: StreamState,
    pub headers: Headers,
    /// A SYN_REPLY went out, or none is due (pushed streams).
    pub reply_sent: bool,
}

impl Stream {
    pub fn is_pushed(&self) -> bool {
        self.id % 2 == 0
    }
}

#[derive(Debug)]
pub struct StreamTable {
    streams: HashMap<u32, Stream>,
    /// Highest client stream id admitted so far.
    last_client_id: u32,
    /// Highest push id handed out so far.
    last_push_id: u32,
    /// Closed stream ids, oldest first.
    closed: VecDeque<u32>,
    closed_retention: usize,
}

impl Default for StreamTable {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CLOSED_STREAM_RETENTION)
    }
}

impl StreamTable {
    pub fn new(closed_retention: usize) -> Self {
        Self {
            streams: HashMap::new(),
            last_client_id: 0,
            last_push_id: 0,
            closed: VecDeque::new(),
            closed_retention,
        }
    }

    /// Register a stream opened by the client's SYN_STREAM.
    pub fn admit_client_stream(
        &mut self,
        id: u32,
        associated_id: u32,
        priority: u8,
        headers: Headers,
    ) -> Result<&Stream> {
        if id == 0 || id % 2 == 0 {
            return Err(SpdyError::ProtocolViolation(format!(
                "client stream id {} must be odd and non-zero",
                id
            )));
        }
        if self.streams.contains_key(&id) {
            return Err(SpdyError::ProtocolViolation(format!("stream {} already exists", id)));
        }
        if id <= self.last_client_id {
            return Err(SpdyError::ProtocolViolation(format!(
                "client stream id {} not greater than previous {}",
                id, self.last_client_id
            )));
        }

        self.last_client_id = id;
        tracing::debug!(stream_id = id, associated_id, priority, "stream opened");
        let stream = Stream {
            id,
            associated_id,
            priority,
            state: StreamState::Open,
            headers,
            reply_sent: false,
        };
        Ok(&*self.streams.entry(id).or_insert(stream))
    }

    /// Hand out the next even id for a server push tied to `associated_id`.
    ///
    /// Pushed streams are unidirectional, so they start with the remote half
    /// already closed.
    pub fn allocate_push_stream(&mut self, associated_id: u32) -> Result<u32> {
        match self.streams.get(&associated_id) {
            Some(stream) if stream.state != StreamState::Closed => {}
            Some(_) => {
                return Err(SpdyError::ProtocolViolation(format!(
                    "cannot push on closed stream {}",
                    associated_id
                )))
            }
            None => {
                return Err(SpdyError::ProtocolViolation(format!(
                    "cannot push on unknown stream {}",
                    associated_id
                )))
            }
        }

        let id = self.last_push_id + 2;
        if id > STREAM_ID_MASK {
            return Err(SpdyError::ProtocolViolation("push stream ids exhausted".to_string()));
        }
        self.last_push_id = id;
        tracing::debug!(stream_id = id, associated_id, "push stream allocated");
        self.streams.insert(
            id,
            Stream {
                id,
                associated_id,
                priority: 0,
                state: StreamState::HalfClosedRemote,
                headers: Headers::new(),
                reply_sent: true,
            },
        );
        Ok(id)
    }

    /// Close one half of a stream and return the resulting state.
    ///
    /// Repeating a FIN for a half that is already closed is a no-op.
    pub fn mark_half_closed(&mut self, id: u32, side: Side) -> Result<StreamState> {
        let stream = self.streams.get_mut(&id).ok_or(SpdyError::UnknownStream(id))?;
        let next = match (stream.state, side) {
            (StreamState::Open, Side::Local) => StreamState::HalfClosedLocal,
            (StreamState::Open, Side::Remote) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedRemote, Side::Local) | (StreamState::HalfClosedLocal, Side::Remote) => {
                StreamState::Closed
            }
            (state, _) => return Ok(state),
        };
        stream.state = next;
        if next == StreamState::Closed {
            self.retire(id);
        }
        Ok(next)
    }

    /// Close a stream outright. Unknown or already closed ids are ignored.
    pub fn close(&mut self, id: u32) {
        match self.streams.get_mut(&id) {
            Some(stream) if stream.state != StreamState::Closed => {
                stream.state = StreamState::Closed;
                self.retire(id);
            }
            _ => {}
        }
    }

    pub fn lookup(&self, id: u32) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn lookup_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Whether `id` was used on this connection but is no longer tracked.
    pub fn is_stale(&self, id: u32) -> bool {
        if self.streams.contains_key(&id) || id == 0 {
            return false;
        }
        if id % 2 == 1 {
            id <= self.last_client_id
        } else {
            id <= self.last_push_id
        }
    }

    pub fn last_client_id(&self) -> u32 {
        self.last_client_id
    }

    pub fn last_push_id(&self) -> u32 {
        self.last_push_id
    }

    /// Number of streams not yet closed.
    pub fn active_count(&self) -> usize {
        self.streams.values().filter(|s| s.state != StreamState::Closed).count()
    }

    /// Number of streams held, closed ones included.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
        self.closed.clear();
        self.last_client_id = 0;
        self.last_push_id = 0;
    }

    fn retire(&mut self, id: u32) {
        tracing::debug!(stream_id = id, "stream closed");
        self.closed.push_back(id);
        while self.closed.len() > self.closed_retention {
            if let Some(old) = self.closed.pop_front() {
                self.streams.remove(&old);
                tracing::trace!(stream_id = old, "evicted closed stream");
            }
        }
    }
}
