//! Tests for malformed frame detection

use spdy_sans_io::{Decoded, Frame, SpdyError, MAX_FRAME_LENGTH};

fn malformed(bytes: &[u8], max: u32) -> String {
    match Frame::decode(bytes, max) {
        Err(SpdyError::MalformedFrame(msg)) => msg,
        other => panic!("Expected MalformedFrame, got {:?}", other),
    }
}

#[test]
fn test_length_over_configured_maximum() {
    let mut bytes = vec![0, 0, 0, 1, 0, 0, 0x10, 0x01]; // 4097 bytes declared
    bytes.extend_from_slice(&vec![0; 4097]);
    let msg = malformed(&bytes, 4096);
    assert!(msg.contains("4097"), "{}", msg);
}

#[test]
fn test_length_at_maximum_is_accepted() {
    let mut bytes = vec![0, 0, 0, 1, 0, 0, 0x10, 0x00]; // exactly 4096
    bytes.extend_from_slice(&vec![0; 4096]);
    assert!(matches!(Frame::decode(&bytes, 4096).unwrap(), Decoded::Frame(_, 4104)));
}

#[test]
fn test_data_frame_stream_zero() {
    let msg = malformed(&[0, 0, 0, 0, 0x01, 0, 0, 2, 1, 2], MAX_FRAME_LENGTH);
    assert!(msg.contains("stream 0"), "{}", msg);
}

#[test]
fn test_unsupported_version() {
    let msg = malformed(&[0x80, 0x03, 0x00, 0x01, 0, 0, 0, 0], MAX_FRAME_LENGTH);
    assert!(msg.contains("version 3"), "{}", msg);
}

#[test]
fn test_unknown_control_type() {
    let msg = malformed(&[0x80, 0x02, 0xFF, 0xFF, 0, 0, 0, 0], MAX_FRAME_LENGTH);
    assert!(msg.contains("unknown control frame type 65535"), "{}", msg);
}

#[test]
fn test_syn_reply_too_short() {
    let msg = malformed(&[0x80, 0x02, 0x00, 0x02, 0, 0, 0, 4, 0, 0, 0, 1], MAX_FRAME_LENGTH);
    assert!(msg.contains("SYN_REPLY"), "{}", msg);
}

#[test]
fn test_rst_stream_wrong_length() {
    let msg = malformed(&[0x80, 0x02, 0x00, 0x03, 0, 0, 0, 4, 0, 0, 0, 1], MAX_FRAME_LENGTH);
    assert!(msg.contains("RST_STREAM"), "{}", msg);
}

#[test]
fn test_ping_wrong_length() {
    let msg = malformed(&[0x80, 0x02, 0x00, 0x06, 0, 0, 0, 2, 0, 1], MAX_FRAME_LENGTH);
    assert!(msg.contains("PING"), "{}", msg);
}

#[test]
fn test_goaway_wrong_length() {
    let msg = malformed(&[0x80, 0x02, 0x00, 0x07, 0, 0, 0, 0], MAX_FRAME_LENGTH);
    assert!(msg.contains("GOAWAY"), "{}", msg);
}

#[test]
fn test_settings_entries_not_matching_count() {
    let bytes = [0x80, 0x02, 0x00, 0x04, 0, 0, 0, 12, 0, 0, 0, 3, 0, 0, 4, 0, 0, 0, 0, 1];
    let msg = malformed(&bytes, MAX_FRAME_LENGTH);
    assert!(msg.contains("SETTINGS"), "{}", msg);
}

#[test]
fn test_errors_are_connection_fatal() {
    let err = Frame::decode(&[0x80, 0x02, 0x00, 0x09, 0, 0, 0, 0], MAX_FRAME_LENGTH).unwrap_err();
    assert!(err.is_fatal());
}
