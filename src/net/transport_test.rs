use super::*;

#[test]
fn inbound_text_passes_text_frames_through() {
    let out = inbound_text(Ok(WsMessage::text("{\"type\":\"send_message\"}"))).unwrap();
    assert_eq!(out.as_deref(), Some("{\"type\":\"send_message\"}"));
}

#[test]
fn inbound_text_decodes_binary_frames_lossily() {
    let out = inbound_text(Ok(WsMessage::binary(b"abc\xff".to_vec()))).unwrap();
    assert_eq!(out.as_deref(), Some("abc\u{fffd}"));
}

#[test]
fn inbound_text_skips_control_frames() {
    assert_eq!(inbound_text(Ok(WsMessage::Ping(Vec::<u8>::new().into()))).unwrap(), None);
    assert_eq!(inbound_text(Ok(WsMessage::Pong(Vec::<u8>::new().into()))).unwrap(), None);
    assert_eq!(inbound_text(Ok(WsMessage::Close(None))).unwrap(), None);
}

#[test]
fn inbound_text_maps_socket_errors() {
    let err = inbound_text(Err(tungstenite::Error::ConnectionClosed)).unwrap_err();
    assert!(matches!(err, TransportError::Receive(_)));
    assert!(err.to_string().starts_with("channel receive failed"));
}
