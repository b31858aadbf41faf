//! Stream state through requests, replies, resets and eviction

use spdy_sans_io::{Config, Frame, SpdyError, SpdyEvent, SpdyServer, StreamState};

use super::{data, decode_all, headers, Client};

#[test]
fn test_send_before_request_is_unknown_stream() {
    let mut server = SpdyServer::new();
    assert_eq!(
        server.send_reply(1, &headers(&[("status", "200 OK")]), false),
        Err(SpdyError::UnknownStream(1))
    );
    assert_eq!(server.send_data(1, b"x", true), Err(SpdyError::UnknownStream(1)));
    assert!(!server.is_failed());
}

#[test]
fn test_send_after_local_fin_is_unknown_stream() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.syn_stream(1, &headers(&[("url", "/")]), false));
    server.send_reply(1, &headers(&[("status", "200 OK")]), false).unwrap();
    server.send_data(1, b"done", true).unwrap();

    assert_eq!(server.lookup(1).unwrap().state, StreamState::HalfClosedLocal);
    assert_eq!(server.send_data(1, b"more", false), Err(SpdyError::UnknownStream(1)));
}

#[test]
fn test_second_reply_is_rejected() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.syn_stream(1, &headers(&[("url", "/")]), false));

    server.send_reply(1, &headers(&[("status", "200 OK")]), false).unwrap();
    let err = server.send_reply(1, &headers(&[("status", "500")]), false).unwrap_err();
    assert!(matches!(err, SpdyError::InvalidStreamState { stream_id: 1, .. }), "{err}");
    assert!(!err.is_fatal());
    assert!(!server.is_failed());

    // The stream carries on with its body.
    let frames = decode_all(&server.send_data(1, b"ok", true).unwrap());
    assert_eq!(frames, vec![Frame::Data { stream_id: 1, flags: spdy_sans_io::flags::FIN, payload: b"ok".to_vec() }]);
}

#[test]
fn test_reply_on_pushed_stream_is_rejected() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));
    let (pushed, _) = server.push_stream(1, &headers(&[("url", "/img.jpg")]), 0).unwrap();

    let err = server.send_reply(pushed, &headers(&[("status", "200 OK")]), false).unwrap_err();
    assert!(matches!(err, SpdyError::InvalidStreamState { stream_id: 2, .. }), "{err}");
    assert!(!server.is_failed());

    // Pushed streams go straight to data.
    assert!(server.send_data(pushed, b"jpeg", true).is_ok());
}

#[test]
fn test_data_before_reply_is_rejected() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));

    let err = server.send_data(1, b"too early", false).unwrap_err();
    assert!(matches!(err, SpdyError::InvalidStreamState { stream_id: 1, .. }), "{err}");
    assert!(!server.is_failed());
    assert_eq!(server.lookup(1).unwrap().state, StreamState::HalfClosedRemote);

    // Nothing was written, so the proper order still works.
    let mut out = server.send_reply(1, &headers(&[("status", "200 OK")]), false).unwrap();
    out.extend(server.send_data(1, b"body", true).unwrap());
    let frames = decode_all(&out);
    assert!(matches!(frames[0], Frame::SynReply { stream_id: 1, .. }));
    assert!(matches!(frames[1], Frame::Data { stream_id: 1, .. }));
}

#[test]
fn test_full_close_needs_both_fins() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.syn_stream(1, &headers(&[("url", "/")]), false));
    assert_eq!(server.lookup(1).unwrap().state, StreamState::Open);

    server.send_reply(1, &headers(&[("status", "200 OK")]), true).unwrap();
    assert_eq!(server.lookup(1).unwrap().state, StreamState::HalfClosedLocal);

    server.on_bytes_received(&data(1, b"", true));
    assert_eq!(server.lookup(1).unwrap().state, StreamState::Closed);
    assert_eq!(server.streams().active_count(), 0);
}

#[test]
fn test_send_data_chunks_at_max_frame_size() {
    let mut client = Client::new();
    // Large enough for the request's SYN_STREAM, small enough to split the body.
    let mut server = SpdyServer::with_config(Config { max_frame_size: 128, ..Config::default() });
    assert_eq!(server.on_bytes_received(&client.get(1, "/")).len(), 1);
    server.send_reply(1, &headers(&[("status", "200 OK")]), false).unwrap();

    let body: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
    let frames = decode_all(&server.send_data(1, &body, true).unwrap());
    let payloads: Vec<_> = frames
        .iter()
        .map(|f| match f {
            Frame::Data { payload, .. } => payload.clone(),
            other => panic!("Expected Data, got {:?}", other),
        })
        .collect();
    assert_eq!(payloads.iter().map(Vec::len).collect::<Vec<_>>(), [128, 128, 44]);
    assert_eq!(payloads.concat(), body);
    let fins: Vec<_> = frames.iter().map(Frame::is_fin).collect();
    assert_eq!(fins, [false, false, true]);
}

#[test]
fn test_send_data_exact_multiple_has_no_empty_tail() {
    let mut client = Client::new();
    let mut server = SpdyServer::with_config(Config { max_frame_size: 128, ..Config::default() });
    server.on_bytes_received(&client.get(1, "/"));
    server.send_reply(1, &headers(&[("status", "200 OK")]), false).unwrap();

    let frames = decode_all(&server.send_data(1, &[0u8; 256], false).unwrap());
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| !f.is_fin()));
}

#[test]
fn test_client_reset_closes_stream() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.syn_stream(1, &headers(&[("url", "/")]), false));

    let events = server.on_bytes_received(&Frame::RstStream { stream_id: 1, status: 5 }.encode());
    assert_eq!(events, vec![SpdyEvent::StreamReset { stream_id: 1, status: 5 }]);
    assert_eq!(server.lookup(1).unwrap().state, StreamState::Closed);
    assert_eq!(server.send_data(1, b"late", true), Err(SpdyError::UnknownStream(1)));

    // Data already in flight from the client is dropped quietly.
    assert!(server.on_bytes_received(&data(1, b"tail", true)).is_empty());
    assert!(!server.is_failed());
}

#[test]
fn test_reset_for_closed_or_evicted_stream_is_dropped() {
    let mut client = Client::new();
    let mut server = SpdyServer::with_config(Config { closed_stream_retention: 1, ..Config::default() });
    server.on_bytes_received(&client.get(1, "/"));
    server.on_bytes_received(&client.get(3, "/"));
    server.close_stream(1);
    server.close_stream(3);
    assert!(server.lookup(1).is_none());

    // 3 is still held as closed, 1 has been evicted.
    assert!(server.on_bytes_received(&Frame::RstStream { stream_id: 3, status: 5 }.encode()).is_empty());
    assert!(server.on_bytes_received(&Frame::RstStream { stream_id: 1, status: 5 }.encode()).is_empty());
    assert!(!server.is_failed());
}

#[test]
fn test_server_reset_stream() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));

    let bytes = server.reset_stream(1, spdy_sans_io::status_code::CANCEL).unwrap();
    assert_eq!(decode_all(&bytes), vec![Frame::RstStream { stream_id: 1, status: 5 }]);
    assert_eq!(server.lookup(1).unwrap().state, StreamState::Closed);
}

#[test]
fn test_close_stream_is_idempotent() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));

    server.close_stream(1);
    server.close_stream(1);
    server.close_stream(99);
    assert_eq!(server.lookup(1).unwrap().state, StreamState::Closed);
}

#[test]
fn test_evicted_streams_drop_late_frames() {
    let mut client = Client::new();
    let mut server = SpdyServer::with_config(Config { closed_stream_retention: 1, ..Config::default() });

    for id in [1, 3, 5] {
        server.on_bytes_received(&client.syn_stream(id, &headers(&[("url", "/")]), false));
        server.close_stream(id);
    }
    assert!(server.lookup(1).is_none());
    assert!(server.lookup(3).is_none());
    assert_eq!(server.lookup(5).unwrap().state, StreamState::Closed);
    assert!(server.streams().is_stale(1));

    assert!(server.on_bytes_received(&data(1, b"late", false)).is_empty());
    assert!(!server.is_failed());
}

#[test]
fn test_headers_frame_delivered_as_event() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.syn_stream(1, &headers(&[("url", "/")]), false));

    let events = server.on_bytes_received(&client.headers_frame(1, &headers(&[("x-extra", "1")]), true));
    assert_eq!(
        events,
        vec![SpdyEvent::HeadersReceived { stream_id: 1, headers: headers(&[("x-extra", "1")]), is_final: true }]
    );
    assert_eq!(server.lookup(1).unwrap().state, StreamState::HalfClosedRemote);
}

#[test]
fn test_headers_on_closed_half_still_inflated() {
    // The block is dropped but the dictionary must advance, or the next
    // request would fail to inflate.
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));

    assert!(server.on_bytes_received(&client.headers_frame(1, &headers(&[("x-late", "1")]), false)).is_empty());
    let events = server.on_bytes_received(&client.get(3, "/next"));
    assert!(matches!(&events[..], [SpdyEvent::RequestHeadersReceived { stream_id: 3, .. }]));
}

#[test]
fn test_goaway_from_client() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));

    let events = server.on_bytes_received(&Frame::GoAway { last_good_stream_id: 0 }.encode());
    assert_eq!(events, vec![SpdyEvent::GoAway { last_good_stream_id: 0 }]);
    assert!(server.is_going_away());
    assert!(!server.is_failed());
}

#[test]
fn test_server_goaway_then_refused_stream_keeps_dictionary() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.syn_stream(1, &headers(&[("url", "/")]), false));

    let bytes = server.go_away();
    assert_eq!(decode_all(&bytes), vec![Frame::GoAway { last_good_stream_id: 1 }]);

    assert!(server.on_bytes_received(&client.get(3, "/refused")).is_empty());
    assert_eq!(server.lookup(3).unwrap().state, StreamState::Closed);

    // The existing stream still receives headers compressed after the
    // refused block.
    let events = server.on_bytes_received(&client.headers_frame(1, &headers(&[("x-after", "yes")]), true));
    assert!(matches!(&events[..], [SpdyEvent::HeadersReceived { stream_id: 1, .. }]));
}

#[test]
fn test_settings_entries_surface() {
    let mut server = SpdyServer::new();
    let entries = vec![
        spdy_sans_io::Setting { id: 4, flags: 0, value: 100 },
        spdy_sans_io::Setting { id: 7, flags: 1, value: 65536 },
    ];
    let events = server.on_bytes_received(&Frame::Settings { flags: 0, entries: entries.clone() }.encode());
    assert_eq!(events, vec![SpdyEvent::Settings { entries }]);
}

#[test]
fn test_reset_then_serve_new_connection() {
    let mut client = Client::new();
    let mut server = SpdyServer::new();
    server.on_bytes_received(&client.get(1, "/"));
    server.reset();

    let mut fresh = Client::new();
    let events = server.on_bytes_received(&fresh.get(1, "/again"));
    match &events[..] {
        [SpdyEvent::RequestHeadersReceived { headers, .. }] => assert_eq!(headers.get("url"), Some("/again")),
        other => panic!("Unexpected events {:?}", other),
    }
}
