//! Server-side SPDY/2 connection engine.
//!
//! `SpdyServer` ties the frame codec, the zlib session and the stream table
//! together. It never does I/O: feed it decrypted bytes with
//! [`SpdyServer::on_bytes_received`] and act on the returned events; every
//! `send_*` call returns the bytes to write, in order, to the transport.

use crate::config::Config;
use crate::error::{Result, SpdyError};
use crate::headers::Headers;
use crate::spdy_codec::{flags, Decoded, Frame, Setting, FRAME_HEADER_SIZE};
use crate::stream::{Side, Stream, StreamState, StreamTable};
use crate::zlib::CompressionSession;

/// Events raised while processing inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpdyEvent {
    /// The client opened a stream with SYN_STREAM.
    RequestHeadersReceived {
        stream_id: u32,
        associated_id: u32,
        priority: u8,
        headers: Headers,
        /// The client will send nothing more on this stream.
        is_final: bool,
    },
    /// Body bytes for a stream.
    DataReceived {
        stream_id: u32,
        data: Vec<u8>,
        is_final: bool,
    },
    /// Extra headers (HEADERS frame) on an open stream.
    HeadersReceived {
        stream_id: u32,
        headers: Headers,
        is_final: bool,
    },
    /// The client cancelled a stream.
    StreamReset {
        stream_id: u32,
        status: u32,
    },
    /// Answer with [`SpdyServer::ping_reply`].
    Ping {
        id: u32,
    },
    Settings {
        entries: Vec<Setting>,
    },
    /// The client will open no more streams.
    GoAway {
        last_good_stream_id: u32,
    },
    /// The connection is unusable and should be closed. Always the last
    /// event the engine produces.
    ConnectionError(SpdyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Active,
    /// We sent GOAWAY: existing streams finish, new ones are refused.
    GoingAway,
    Failed,
}

/// One accepted SPDY connection, server side.
///
/// All state is owned here and every mutation goes through `&mut self`, so
/// the zlib dictionary sees header blocks in exactly the order they appear
/// on the wire.
#[derive(Debug)]
pub struct SpdyServer {
    config: Config,
    /// Bytes received but not yet forming a complete frame.
    buffer: Vec<u8>,
    streams: StreamTable,
    zlib: CompressionSession,
    state: ConnState,
    /// The client sent GOAWAY.
    peer_going_away: bool,
}

impl Default for SpdyServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpdyServer {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let config = config.normalized();
        Self {
            streams: StreamTable::new(config.closed_stream_retention),
            zlib: CompressionSession::new(config.compression_level, config.max_header_block_size),
            config,
            buffer: Vec::new(),
            state: ConnState::Active,
            peer_going_away: false,
        }
    }

    /// Process incoming data and return the resulting events.
    ///
    /// Incomplete frames are buffered until the rest arrives. A fatal error
    /// ends the batch with [`SpdyEvent::ConnectionError`]; after that all
    /// input is ignored.
    pub fn on_bytes_received(&mut self, data: &[u8]) -> Vec<SpdyEvent> {
        let mut events = Vec::new();
        if self.state == ConnState::Failed {
            tracing::trace!(len = data.len(), "discarding input on failed connection");
            return events;
        }

        self.buffer.extend_from_slice(data);
        let mut pos = 0;
        loop {
            match Frame::decode(&self.buffer[pos..], self.config.max_frame_size) {
                Ok(Decoded::NeedMoreData) => break,
                Ok(Decoded::Frame(frame, consumed)) => {
                    pos += consumed;
                    if let Err(e) = self.handle_frame(frame, &mut events) {
                        self.fail(e, &mut events);
                        return events;
                    }
                }
                Err(e) => {
                    self.fail(e, &mut events);
                    return events;
                }
            }
        }
        self.buffer.drain(..pos);
        events
    }

    fn handle_frame(&mut self, frame: Frame, events: &mut Vec<SpdyEvent>) -> Result<()> {
        tracing::trace!(stream_id = ?frame.stream_id(), flags = frame.flags(), "frame received");
        match frame {
            Frame::SynStream { stream_id, associated_id, priority, flags: frame_flags, header_block } => {
                // Inflate first, whatever happens to the stream, so the
                // dictionary stays in step with the client's deflater.
                let headers = self.zlib.decompress_headers(&header_block)?;

                if self.state == ConnState::GoingAway {
                    self.streams.admit_client_stream(stream_id, associated_id, priority, Headers::new())?;
                    self.streams.close(stream_id);
                    tracing::debug!(stream_id, "refusing stream after GOAWAY");
                    return Ok(());
                }

                self.streams.admit_client_stream(stream_id, associated_id, priority, headers.clone())?;
                if frame_flags & flags::UNIDIRECTIONAL != 0 {
                    self.streams.mark_half_closed(stream_id, Side::Local)?;
                }
                let is_final = frame_flags & flags::FIN != 0;
                if is_final {
                    self.streams.mark_half_closed(stream_id, Side::Remote)?;
                }
                events.push(SpdyEvent::RequestHeadersReceived {
                    stream_id,
                    associated_id,
                    priority,
                    headers,
                    is_final,
                });
            }
            Frame::Data { stream_id, flags: frame_flags, payload } => {
                if !self.accepts_from_peer(stream_id)? {
                    return Ok(());
                }
                let is_final = frame_flags & flags::FIN != 0;
                if is_final {
                    self.streams.mark_half_closed(stream_id, Side::Remote)?;
                }
                events.push(SpdyEvent::DataReceived {
                    stream_id,
                    data: payload,
                    is_final,
                });
            }
            Frame::Headers { stream_id, flags: frame_flags, header_block } => {
                let headers = self.zlib.decompress_headers(&header_block)?;
                if !self.accepts_from_peer(stream_id)? {
                    return Ok(());
                }
                let is_final = frame_flags & flags::FIN != 0;
                if is_final {
                    self.streams.mark_half_closed(stream_id, Side::Remote)?;
                }
                events.push(SpdyEvent::HeadersReceived { stream_id, headers, is_final });
            }
            Frame::SynReply { stream_id, .. } => {
                return Err(SpdyError::ProtocolViolation(format!(
                    "SYN_REPLY from client on stream {}",
                    stream_id
                )));
            }
            Frame::RstStream { stream_id, status } => {
                if !self.accepts_reset(stream_id)? {
                    return Ok(());
                }
                tracing::debug!(stream_id, status, "stream reset by peer");
                self.streams.close(stream_id);
                events.push(SpdyEvent::StreamReset { stream_id, status });
            }
            Frame::Settings { entries, .. } => events.push(SpdyEvent::Settings { entries }),
            Frame::Noop => {}
            Frame::Ping { id } => events.push(SpdyEvent::Ping { id }),
            Frame::GoAway { last_good_stream_id } => {
                tracing::debug!(last_good_stream_id, "peer going away");
                self.peer_going_away = true;
                events.push(SpdyEvent::GoAway { last_good_stream_id });
            }
        }
        Ok(())
    }

    /// Whether a DATA/HEADERS frame from the client should be delivered.
    ///
    /// Frames for a stream whose remote half is already closed, or for an
    /// evicted stream, are late duplicates and get dropped. Frames for ids
    /// that were never opened break the protocol.
    fn accepts_from_peer(&self, stream_id: u32) -> Result<bool> {
        match self.streams.lookup(stream_id) {
            Some(stream) if stream.state.can_recv() => Ok(true),
            Some(stream) => {
                tracing::debug!(stream_id, state = ?stream.state, "dropping frame for closed half");
                Ok(false)
            }
            None if self.streams.is_stale(stream_id) => {
                tracing::debug!(stream_id, "dropping frame for evicted stream");
                Ok(false)
            }
            None => Err(SpdyError::ProtocolViolation(format!("frame for idle stream {}", stream_id))),
        }
    }

    /// Whether a RST_STREAM from the client names a stream worth resetting.
    ///
    /// Resets for streams already closed or evicted are dropped. Stream 0
    /// and ids never opened are protocol violations.
    fn accepts_reset(&self, stream_id: u32) -> Result<bool> {
        match self.streams.lookup(stream_id) {
            Some(stream) if stream.state != StreamState::Closed => Ok(true),
            Some(_) => {
                tracing::debug!(stream_id, "dropping reset for closed stream");
                Ok(false)
            }
            None if self.streams.is_stale(stream_id) => {
                tracing::debug!(stream_id, "dropping reset for evicted stream");
                Ok(false)
            }
            None => Err(SpdyError::ProtocolViolation(format!("RST_STREAM for idle stream {}", stream_id))),
        }
    }

    /// Build a SYN_REPLY for a client stream.
    ///
    /// Exactly one reply per client stream; pushed streams never get one.
    pub fn send_reply(&mut self, stream_id: u32, headers: &Headers, is_final: bool) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        let stream = self.ensure_can_send(stream_id)?;
        if stream.is_pushed() {
            return Err(SpdyError::InvalidStreamState {
                stream_id,
                reason: "pushed streams take no SYN_REPLY",
            });
        }
        if stream.reply_sent {
            return Err(SpdyError::InvalidStreamState { stream_id, reason: "reply already sent" });
        }

        let header_block = self.compress(headers)?;
        if let Some(stream) = self.streams.lookup_mut(stream_id) {
            stream.reply_sent = true;
        }
        let frame = Frame::SynReply {
            stream_id,
            flags: fin_flag(is_final),
            header_block,
        };
        if is_final {
            self.streams.mark_half_closed(stream_id, Side::Local)?;
        }
        tracing::debug!(stream_id, is_final, "reply sent");
        Ok(frame.encode())
    }

    /// Build data frames for a stream, split at `max_frame_size`.
    ///
    /// FIN is set on the last frame iff `is_final`; an empty payload still
    /// produces one frame so a bare FIN can be sent.
    pub fn send_data(&mut self, stream_id: u32, data: &[u8], is_final: bool) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        if !self.ensure_can_send(stream_id)?.reply_sent {
            return Err(SpdyError::InvalidStreamState {
                stream_id,
                reason: "data before SYN_REPLY",
            });
        }

        let chunk_size = self.config.max_frame_size as usize;
        let frame_count = data.len().div_ceil(chunk_size).max(1);
        let mut out = Vec::with_capacity(data.len() + frame_count * FRAME_HEADER_SIZE);

        if data.is_empty() {
            Frame::Data { stream_id, flags: fin_flag(is_final), payload: Vec::new() }.encode_into(&mut out);
        } else {
            let mut chunks = data.chunks(chunk_size).peekable();
            while let Some(chunk) = chunks.next() {
                let last = chunks.peek().is_none();
                Frame::Data {
                    stream_id,
                    flags: fin_flag(last && is_final),
                    payload: chunk.to_vec(),
                }
                .encode_into(&mut out);
            }
        }

        if is_final {
            self.streams.mark_half_closed(stream_id, Side::Local)?;
        }
        tracing::trace!(stream_id, len = data.len(), frames = frame_count, is_final, "data sent");
        Ok(out)
    }

    /// Open a server push stream tied to `associated_id`.
    ///
    /// Returns the new (even) stream id and the SYN_STREAM bytes; deliver the
    /// pushed body with [`send_data`](Self::send_data) on that id.
    pub fn push_stream(&mut self, associated_id: u32, headers: &Headers, priority: u8) -> Result<(u32, Vec<u8>)> {
        self.ensure_usable()?;
        if self.state == ConnState::GoingAway || self.peer_going_away {
            return Err(SpdyError::ConnectionClosed);
        }

        let priority = priority.min(3);
        let stream_id = self.streams.allocate_push_stream(associated_id)?;
        let header_block = match self.compress(headers) {
            Ok(block) => block,
            Err(e) => {
                self.streams.close(stream_id);
                return Err(e);
            }
        };
        if let Some(stream) = self.streams.lookup_mut(stream_id) {
            stream.priority = priority;
            stream.headers = headers.clone();
        }

        let frame = Frame::SynStream {
            stream_id,
            associated_id,
            priority,
            flags: flags::UNIDIRECTIONAL,
            header_block,
        };
        tracing::debug!(stream_id, associated_id, priority, "push stream opened");
        Ok((stream_id, frame.encode()))
    }

    /// Build a RST_STREAM and close the stream locally.
    pub fn reset_stream(&mut self, stream_id: u32, status: u32) -> Result<Vec<u8>> {
        self.ensure_usable()?;
        self.streams.close(stream_id);
        tracing::debug!(stream_id, status, "stream reset");
        Ok(Frame::RstStream { stream_id, status }.encode())
    }

    /// Forget a stream without telling the peer (e.g. the client went away).
    /// Unknown and already closed ids are ignored.
    pub fn close_stream(&mut self, stream_id: u32) {
        self.streams.close(stream_id);
    }

    /// Echo a client PING.
    pub fn ping_reply(&self, id: u32) -> Vec<u8> {
        Frame::Ping { id }.encode()
    }

    /// Build a GOAWAY naming the last client stream we accepted. Streams
    /// opened after this are refused.
    pub fn go_away(&mut self) -> Vec<u8> {
        if self.state == ConnState::Active {
            self.state = ConnState::GoingAway;
        }
        let last_good_stream_id = self.streams.last_client_id();
        tracing::debug!(last_good_stream_id, "going away");
        Frame::GoAway { last_good_stream_id }.encode()
    }

    pub fn lookup(&self, stream_id: u32) -> Option<&Stream> {
        self.streams.lookup(stream_id)
    }

    pub fn streams(&self) -> &StreamTable {
        &self.streams
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_failed(&self) -> bool {
        self.state == ConnState::Failed
    }

    pub fn is_going_away(&self) -> bool {
        self.state == ConnState::GoingAway || self.peer_going_away
    }

    /// Drop all connection state, including the zlib dictionaries. Call when
    /// the transport closes; the value can then serve a new connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.streams.clear();
        self.zlib.reset();
        self.state = ConnState::Active;
        self.peer_going_away = false;
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state == ConnState::Failed {
            return Err(SpdyError::ConnectionClosed);
        }
        Ok(())
    }

    fn ensure_can_send(&self, stream_id: u32) -> Result<&Stream> {
        match self.streams.lookup(stream_id) {
            Some(stream) if stream.state.can_send() => Ok(stream),
            _ => Err(SpdyError::UnknownStream(stream_id)),
        }
    }

    fn compress(&mut self, headers: &Headers) -> Result<Vec<u8>> {
        match self.zlib.compress_headers(headers) {
            Ok(block) => Ok(block),
            Err(e) => {
                if e.is_fatal() {
                    tracing::warn!(error = %e, "header compression failed, connection unusable");
                    self.state = ConnState::Failed;
                    self.buffer.clear();
                }
                Err(e)
            }
        }
    }

    fn fail(&mut self, error: SpdyError, events: &mut Vec<SpdyEvent>) {
        tracing::warn!(error = %error, "connection failed");
        self.state = ConnState::Failed;
        self.buffer.clear();
        events.push(SpdyEvent::ConnectionError(error));
    }
}

fn fin_flag(is_final: bool) -> u8 {
    if is_final {
        flags::FIN
    } else {
        0
    }
}
