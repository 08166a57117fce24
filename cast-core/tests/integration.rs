//! Integration tests — handshake, frame delivery, and partial-delivery
//! behavior over a real TCP connection on localhost.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cast_core::{
    ClientSession, Connection, ConnectionInfo, FramePiece, FramePieceTracker, HEADER_SIZE,
    Message, MessageCode, SessionEvent, SessionHandle, SessionType, StreamSettings,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a listener on an OS-assigned port and return the connection
/// info. The listener is returned so the caller can accept on it.
async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    (listener, info)
}

/// Connect a screen-capture session and return the relay-side stream
/// once the handshake is complete.
async fn authenticated_pair(
    session_type: SessionType,
) -> (SessionHandle, Arc<FramePieceTracker>, TcpStream) {
    let (listener, info) = ephemeral_listener().await;
    let tracker = Arc::new(FramePieceTracker::new());

    let connect = tokio::spawn({
        let info = info.clone();
        async move { Connection::connect(&info).await.unwrap() }
    });
    let (mut relay_stream, _) = listener.accept().await.unwrap();
    let conn = connect.await.unwrap();

    let (session, mut handle) = ClientSession::new(session_type, conn, Arc::clone(&tracker));
    tokio::spawn(session.run());

    // relay: read the auth request, reply success
    let mut request = [0u8; HEADER_SIZE];
    relay_stream.read_exact(&mut request).await.unwrap();
    assert_eq!(request[0], session_type.auth_code() as u8);
    relay_stream
        .write_all(&Message::header_only(MessageCode::AuthSuccess).encode())
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), handle.next_event())
        .await
        .expect("timeout")
        .expect("session ended early");
    assert_eq!(event, SessionEvent::Authenticated);

    (handle, tracker, relay_stream)
}

async fn next_event(handle: &mut SessionHandle) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), handle.next_event())
        .await
        .expect("timeout")
        .expect("session ended early")
}

// ── Handshake ────────────────────────────────────────────────────

#[tokio::test]
async fn screen_capture_handshake() {
    // code 2 out, code 5 back, exactly one Authenticated event
    let (mut handle, _tracker, _relay) = authenticated_pair(SessionType::ScreenCapture).await;
    handle.close().await.unwrap();
    assert_eq!(next_event(&mut handle).await, SessionEvent::Closed);
}

#[tokio::test]
async fn auth_failure_tears_down_without_success_event() {
    let (listener, info) = ephemeral_listener().await;
    let tracker = Arc::new(FramePieceTracker::new());

    let connect = tokio::spawn({
        let info = info.clone();
        async move { Connection::connect(&info).await.unwrap() }
    });
    let (mut relay_stream, _) = listener.accept().await.unwrap();
    let conn = connect.await.unwrap();

    let (session, mut handle) = ClientSession::new(SessionType::Movie, conn, tracker);
    tokio::spawn(session.run());

    let mut request = [0u8; HEADER_SIZE];
    relay_stream.read_exact(&mut request).await.unwrap();
    assert_eq!(request[0], MessageCode::AuthMovie as u8);
    relay_stream
        .write_all(&Message::header_only(MessageCode::AuthFailed).encode())
        .await
        .unwrap();

    // the only event is Closed — no retry, no Authenticated
    assert_eq!(next_event(&mut handle).await, SessionEvent::Closed);
    assert!(handle.next_event().await.is_none());
}

// ── Frame delivery ───────────────────────────────────────────────

#[tokio::test]
async fn frame_piece_is_acked_and_tracked() {
    let (mut handle, tracker, mut relay) = authenticated_pair(SessionType::ScreenCapture).await;

    let piece = FramePiece::new(42, 0, Bytes::from(vec![0xAB; 128]));
    let msg = Message::with_content(MessageCode::ScreenNewFrame, piece.encode()).unwrap();
    relay.write_all(&msg.encode()).await.unwrap();

    // the viewer acks receipt with a header-only code-16 message
    let mut ack = [0u8; HEADER_SIZE];
    tokio::time::timeout(Duration::from_secs(5), relay.read_exact(&mut ack))
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(ack[0], MessageCode::ScreenFrameReceived as u8);
    assert_eq!(u32::from_le_bytes(ack[1..5].try_into().unwrap()), 0);

    assert_eq!(
        next_event(&mut handle).await,
        SessionEvent::PieceStored {
            frame_index: 42,
            piece_index: 0
        }
    );
    let snap = tracker.snapshot(42).unwrap();
    assert_eq!(snap.piece_count(), 1);
    assert_eq!(snap.total_bytes, 128);
}

#[tokio::test]
async fn out_of_order_pieces_reassemble() {
    let (mut handle, tracker, mut relay) = authenticated_pair(SessionType::ScreenCapture).await;

    for (index, payload) in [(2u8, b"cc".as_slice()), (0, b"aa"), (1, b"bb")] {
        let piece = FramePiece::new(9, index, Bytes::copy_from_slice(payload));
        let msg = Message::with_content(MessageCode::ScreenNewFrame, piece.encode()).unwrap();
        relay.write_all(&msg.encode()).await.unwrap();
    }

    for _ in 0..3 {
        assert!(matches!(
            next_event(&mut handle).await,
            SessionEvent::PieceStored { frame_index: 9, .. }
        ));
    }
    assert_eq!(&tracker.claim(9).unwrap()[..], b"aabbcc");
}

// ── Partial delivery ─────────────────────────────────────────────

#[tokio::test]
async fn byte_at_a_time_delivery_is_invariant() {
    let (mut handle, tracker, mut relay) = authenticated_pair(SessionType::ScreenCapture).await;

    // three messages, written one byte at a time
    let mut wire = Vec::new();
    for index in 0..3u8 {
        let piece = FramePiece::new(5, index, Bytes::from(vec![index; 4]));
        let msg = Message::with_content(MessageCode::ScreenNewFrame, piece.encode()).unwrap();
        wire.extend_from_slice(&msg.encode());
    }
    for byte in wire {
        relay.write_all(&[byte]).await.unwrap();
        relay.flush().await.unwrap();
    }

    let mut stored = Vec::new();
    for _ in 0..3 {
        match next_event(&mut handle).await {
            SessionEvent::PieceStored {
                frame_index: 5,
                piece_index,
            } => stored.push(piece_index),
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(stored, vec![0, 1, 2]);
    assert_eq!(tracker.snapshot(5).unwrap().total_bytes, 12);
}

// ── Control plane ────────────────────────────────────────────────

#[tokio::test]
async fn start_stream_and_settings_reach_relay() {
    let (handle, _tracker, mut relay) = authenticated_pair(SessionType::ScreenCapture).await;

    handle
        .change_settings(StreamSettings::new().with_quality(40).with_scale(80))
        .await
        .unwrap();
    handle.start_stream().await.unwrap();

    let mut settings_msg = [0u8; HEADER_SIZE + 13];
    relay.read_exact(&mut settings_msg).await.unwrap();
    assert_eq!(settings_msg[0], MessageCode::ScreenChangeSetting as u8);
    let settings = StreamSettings::decode(&settings_msg[HEADER_SIZE..]).unwrap();
    assert_eq!(settings.source_quality, 40);
    assert_eq!(settings.source_scale, 80);

    let mut start = [0u8; HEADER_SIZE];
    relay.read_exact(&mut start).await.unwrap();
    assert_eq!(start[0], MessageCode::ScreenStart as u8);
}

#[tokio::test]
async fn input_session_round_trip() {
    let (mut handle, _tracker, mut relay) = authenticated_pair(SessionType::InputCapture).await;

    handle.start_input().await.unwrap();
    handle
        .send_input(cast_core::InputReport::new(
            cast_core::ButtonMask::A | cast_core::ButtonMask::START,
            cast_core::ButtonMask::empty(),
            100,
            -100,
            0,
            0,
        ))
        .await
        .unwrap();
    handle.send_idle_input().await.unwrap();

    let mut start = [0u8; HEADER_SIZE];
    relay.read_exact(&mut start).await.unwrap();
    assert_eq!(start[0], MessageCode::InputStart as u8);

    let mut report_msg = [0u8; HEADER_SIZE + 16];
    relay.read_exact(&mut report_msg).await.unwrap();
    assert_eq!(report_msg[0], MessageCode::InputSend as u8);
    let report = cast_core::InputReport::decode(&report_msg[HEADER_SIZE..]).unwrap();
    assert!(report.down.contains(cast_core::ButtonMask::A));
    assert_eq!(report.circle_x, 100);

    let mut idle = [0u8; HEADER_SIZE];
    relay.read_exact(&mut idle).await.unwrap();
    assert_eq!(idle[0], MessageCode::InputSendIdle as u8);

    handle.command(cast_core::SessionCommand::StopInput).await.unwrap();
    let mut stop = [0u8; HEADER_SIZE];
    relay.read_exact(&mut stop).await.unwrap();
    assert_eq!(stop[0], MessageCode::InputStop as u8);
    assert_eq!(next_event(&mut handle).await, SessionEvent::Closed);
}

#[tokio::test]
async fn relay_disconnect_closes_session() {
    let (mut handle, _tracker, relay) = authenticated_pair(SessionType::ScreenCapture).await;
    drop(relay);
    assert_eq!(next_event(&mut handle).await, SessionEvent::Closed);
}
