//! Integration tests for a single connection over real loopback sockets.
//!
//! One end of each socket pair is driven by a [`Peer`]; the other end is
//! either a raw `TcpStream` the test reads and writes by hand, or a
//! second `Peer`.

use std::sync::Arc;
use std::time::Duration;

use bgblink_peer::{
    Dispatcher, LoggingHandler, Peer, PeerId, PeerState, RelayHandler,
    TransportError,
};
use bgblink_protocol::{Defines, Frame, FRAME_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// =========================================================================
// Helpers
// =========================================================================

async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (client, accepted) =
        tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.expect("connect"), accepted.expect("accept").0)
}

async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut buf = [0u8; FRAME_LEN];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("frame should arrive")
        .expect("read frame");
    buf
}

const VERSION_1_4: Frame = [0x01, 0x01, 0x04, 0, 0, 0, 0, 0];
const STATUS_OWN: Frame = [0x6C, 0x04, 0, 0, 0, 0, 0, 0];

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_version_sent_on_connect_and_status_after_handshake() {
    let (local, mut remote) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::new(Defines::BGB_1_4, LoggingHandler));
    let peer = Peer::new(local, Some(PeerId::new(0)), dispatcher);
    let handle = peer.handle().clone();
    tokio::spawn(peer.run());

    assert_eq!(read_frame(&mut remote).await, VERSION_1_4);

    remote.write_all(&VERSION_1_4).await.unwrap();
    assert_eq!(read_frame(&mut remote).await, STATUS_OWN);
    assert_eq!(handle.state(), PeerState::Active);
}

#[tokio::test]
async fn test_queued_frames_arrive_in_order() {
    let (local, mut remote) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::new(Defines::BGB_1_4, LoggingHandler));
    let peer = Peer::new(local, None, dispatcher);
    let handle = peer.handle().clone();
    tokio::spawn(peer.run());

    for i in 0..4u8 {
        handle.send([0x65, i, 0, 0, 0, 0, 0, 0]);
    }

    assert_eq!(read_frame(&mut remote).await, VERSION_1_4);
    for i in 0..4u8 {
        assert_eq!(read_frame(&mut remote).await, [0x65, i, 0, 0, 0, 0, 0, 0]);
    }
}

#[tokio::test]
async fn test_incomplete_frame_ends_connection() {
    let (local, mut remote) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::new(Defines::BGB_1_4, LoggingHandler));
    let peer = Peer::new(local, Some(PeerId::new(3)), dispatcher);
    let handle = peer.handle().clone();
    let task = tokio::spawn(peer.run());

    remote.write_all(&[0x65, 0x0B, 0x00]).await.unwrap();
    drop(remote);

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run should finish")
        .expect("task should not panic");
    assert!(matches!(result, Err(TransportError::ConnectionLost(_))));
    assert_eq!(handle.state(), PeerState::Closed);

    // Sends after teardown are silently dropped.
    handle.send(STATUS_OWN);
}

#[tokio::test]
async fn test_unknown_command_tears_down_connection() {
    let (local, mut remote) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::new(Defines::BGB_1_4, LoggingHandler));
    let peer = Peer::new(local, None, dispatcher);
    let task = tokio::spawn(peer.run());

    remote.write_all(&[0x99, 0, 0, 0, 0, 0, 0, 0]).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run should finish")
        .expect("task should not panic");
    assert!(matches!(result, Err(TransportError::Protocol(_))));
}

#[tokio::test]
async fn test_close_ends_run_and_closes_socket() {
    let (local, mut remote) = socket_pair().await;
    let dispatcher = Arc::new(Dispatcher::new(Defines::BGB_1_4, LoggingHandler));
    let peer = Peer::new(local, None, dispatcher);
    let handle = peer.handle().clone();
    let task = tokio::spawn(peer.run());

    assert_eq!(read_frame(&mut remote).await, VERSION_1_4);
    handle.close();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run should finish")
        .expect("task should not panic");
    assert!(result.is_ok());

    tokio::time::timeout(Duration::from_secs(2), handle.closed())
        .await
        .expect("closed should resolve");

    // Remote side sees EOF once both halves are gone.
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), remote.read(&mut buf))
        .await
        .expect("read should finish")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_version_mismatch_shuts_down_both_sides() {
    let (left, right) = socket_pair().await;
    let newer = Defines {
        minor: 5,
        ..Defines::BGB_1_4
    };

    let left = Peer::new(
        left,
        Some(PeerId::new(0)),
        Arc::new(Dispatcher::new(Defines::BGB_1_4, RelayHandler::new(LoggingHandler))),
    );
    let right = Peer::new(
        right,
        Some(PeerId::new(1)),
        Arc::new(Dispatcher::new(newer, RelayHandler::new(LoggingHandler))),
    );
    let (lh, rh) = (left.handle().clone(), right.handle().clone());

    let (l, r) = tokio::time::timeout(
        Duration::from_secs(2),
        async { tokio::join!(left.run(), right.run()) },
    )
    .await
    .expect("both sides should shut down");

    assert!(l.is_ok() || matches!(l, Err(TransportError::ConnectionLost(_))));
    assert!(r.is_ok() || matches!(r, Err(TransportError::ConnectionLost(_))));
    assert_eq!(lh.state(), PeerState::Closed);
    assert_eq!(rh.state(), PeerState::Closed);
    assert_eq!(lh.peer_status(), None);
    assert_eq!(rh.peer_status(), None);
}
