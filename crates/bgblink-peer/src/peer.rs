//! One live link connection.
//!
//! A connection is split in two halves:
//!
//! - [`PeerHandle`]: the shared, cheaply cloneable side. Anyone holding
//!   one can queue frames, read the peer's status, or link it to another
//!   peer. This is what the server registry stores.
//! - [`Peer`]: the owning side. It holds the socket and the receiving
//!   end of the outbound queue, and [`Peer::run`] drives the read and
//!   write loops until the connection ends.
//!
//! ```text
//!   callers ──send()──▶ mpsc queue ──▶ write loop ──▶ socket
//!                                                       │
//!   handler ◀── dispatcher ◀── read loop (8 bytes) ◀────┘
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use bgblink_protocol::{Frame, Packet, StatusFlags, StatusPacket, FRAME_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::{lock, Dispatcher, PacketHandler, PeerId, TransportError};

// ---------------------------------------------------------------------------
// PeerState
// ---------------------------------------------------------------------------

/// Lifecycle of a connection.
///
/// States only move forward, in declaration order:
///
/// ```text
/// Handshaking ──version ok──▶ Active ──▶ Closed
///      │                        │          ▲
///      └──version mismatch──▶ Closing ─────┘
/// ```
///
/// A connection is *live* (the `active` flag of the protocol) while it is
/// `Handshaking` or `Active`. Frames queued to a peer that is not live
/// are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeerState {
    /// Version packet sent, peer's version not yet seen.
    Handshaking,
    /// Versions matched and our status was sent.
    Active,
    /// Marked for shutdown; the read loop stops at the next frame.
    Closing,
    /// Read loop ended and the socket is closed.
    Closed,
}

impl PeerState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Handshaking | Self::Active)
    }
}

// ---------------------------------------------------------------------------
// PeerHandle
// ---------------------------------------------------------------------------

struct Shared {
    id: Option<PeerId>,
    name: String,
    own_status: StatusFlags,
    peer_status: Mutex<Option<StatusFlags>>,
    state: watch::Sender<PeerState>,
    outbound: mpsc::UnboundedSender<Frame>,
    link: Mutex<Option<PeerHandle>>,
}

/// Shared handle to a connection.
///
/// Cloning is an `Arc` bump. Two handles compare equal when they point
/// at the same connection.
#[derive(Clone)]
pub struct PeerHandle {
    inner: Arc<Shared>,
}

impl PeerHandle {
    /// Creates a handle and the receiving end of its outbound queue.
    ///
    /// [`Peer::new`] calls this for socket-backed connections. It is
    /// public so a handle can also be wired to something other than a
    /// socket (tests inspect the receiver directly).
    pub fn new(
        id: Option<PeerId>,
        name: impl Into<String>,
        own_status: StatusFlags,
    ) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(PeerState::Handshaking);
        let handle = Self {
            inner: Arc::new(Shared {
                id,
                name: name.into(),
                own_status,
                peer_status: Mutex::new(None),
                state,
                outbound: tx,
                link: Mutex::new(None),
            }),
        };
        (handle, rx)
    }

    /// Server-assigned identifier, `None` on the client side.
    pub fn id(&self) -> Option<PeerId> {
        self.inner.id
    }

    /// Remote address label.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> PeerState {
        *self.inner.state.borrow()
    }

    /// `true` while the connection is handshaking or active.
    pub fn is_active(&self) -> bool {
        self.state().is_live()
    }

    /// Status bits this side advertises.
    pub fn own_status(&self) -> StatusFlags {
        self.inner.own_status
    }

    /// Last status the remote side reported, if any.
    pub fn peer_status(&self) -> Option<StatusFlags> {
        *lock(&self.inner.peer_status)
    }

    /// Queues an encoded frame for the write loop.
    ///
    /// Never blocks. If the connection is not live the frame is dropped
    /// without error: callers fire and forget, and a frame meant for a
    /// dead link has nowhere useful to go. Frames from one caller reach
    /// the socket in the order they were queued.
    pub fn send(&self, frame: Frame) {
        if !self.is_active() {
            tracing::trace!(peer = %self, "peer not live, dropping frame");
            return;
        }
        if self.inner.outbound.send(frame).is_err() {
            tracing::trace!(peer = %self, "write loop gone, dropping frame");
        }
    }

    /// Encodes and queues a packet. Same contract as [`send`](Self::send).
    pub fn send_packet(&self, packet: &Packet) {
        self.send(packet.encode());
    }

    /// Marks the connection for shutdown.
    ///
    /// The read loop notices immediately, even while blocked on the
    /// socket, and [`Peer::run`] then tears the connection down.
    pub fn close(&self) {
        self.advance(PeerState::Closing);
    }

    /// Resolves once the connection is no longer live.
    pub async fn inactive(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| !state.is_live()).await;
    }

    /// Resolves once the read loop has ended and the socket is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == PeerState::Closed).await;
    }

    pub(crate) fn advance(&self, next: PeerState) {
        let changed = self.inner.state.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::trace!(peer = %self, state = ?next, "peer state changed");
        }
    }

    pub(crate) fn record_peer_status(&self, status: StatusFlags) {
        *lock(&self.inner.peer_status) = Some(status);
    }

    // -- Proxy link --

    /// The peer this one currently relays to, if any.
    pub fn linked(&self) -> Option<PeerHandle> {
        lock(&self.inner.link).clone()
    }

    /// Pairs this connection with `other`.
    ///
    /// From now on a [`RelayHandler`](crate::RelayHandler) on this
    /// connection forwards link traffic to `other`. The link's current
    /// status (the remote side's last reported status, or our own if it
    /// has not reported one) is sent to `other` right away so a late
    /// joiner does not wait for the next status change.
    ///
    /// The pairing is one-directional; call it on both handles for a
    /// two-way relay. It is cleared as soon as either connection stops
    /// being live. A previous pairing is replaced.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn link_to(&self, other: &PeerHandle) {
        if self == other {
            tracing::warn!(peer = %self, "refusing to link a peer to itself");
            return;
        }

        *lock(&self.inner.link) = Some(other.clone());

        let status = self.peer_status().unwrap_or(self.own_status());
        other.send_packet(&Packet::Status(StatusPacket::new(status)));
        tracing::info!(peer = %self, target = %other, %status, "peers linked");

        let this = self.clone();
        let other = other.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = other.inactive() => {}
                _ = this.inactive() => {}
            }
            this.unlink_from(&other);
        });
    }

    /// Clears the pairing unconditionally.
    pub fn unlink(&self) {
        if let Some(old) = lock(&self.inner.link).take() {
            tracing::info!(peer = %self, target = %old, "peers unlinked");
        }
    }

    /// Clears the pairing only if it still points at `other`.
    fn unlink_from(&self, other: &PeerHandle) {
        let mut link = lock(&self.inner.link);
        if link.as_ref() == Some(other) {
            *link = None;
            drop(link);
            tracing::info!(peer = %self, target = %other, "peers unlinked");
        }
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PeerHandle {}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.id {
            Some(id) => write!(f, "{id} ({})", self.inner.name),
            None => f.write_str(&self.inner.name),
        }
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

/// The owning side of a socket-backed connection.
pub struct Peer<H: PacketHandler> {
    handle: PeerHandle,
    stream: TcpStream,
    outbound: mpsc::UnboundedReceiver<Frame>,
    dispatcher: Arc<Dispatcher<H>>,
}

impl<H: PacketHandler> Peer<H> {
    /// Wraps an established socket and queues the Version packet.
    pub fn new(
        stream: TcpStream,
        id: Option<PeerId>,
        dispatcher: Arc<Dispatcher<H>>,
    ) -> Self {
        let name = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (handle, outbound) =
            PeerHandle::new(id, name, dispatcher.defines().own_status);
        handle.send_packet(&dispatcher.codec().version_packet());
        Self {
            handle,
            stream,
            outbound,
            dispatcher,
        }
    }

    pub fn handle(&self) -> &PeerHandle {
        &self.handle
    }

    /// Runs the connection to completion.
    ///
    /// The write loop runs as its own task; the read loop runs here.
    /// When the read loop ends the peer is marked `Closed` and only then
    /// is the write task cancelled, which drops the socket's write half.
    ///
    /// # Errors
    /// Returns why the read loop ended if it was not a requested
    /// shutdown (version mismatch or [`PeerHandle::close`]). The error
    /// is already logged; it is returned for the owner's bookkeeping.
    pub async fn run(self) -> Result<(), TransportError> {
        let Self {
            handle,
            stream,
            outbound,
            dispatcher,
        } = self;
        let (reader, writer) = stream.into_split();

        let write_task = tokio::spawn(write_loop(writer, outbound, handle.clone()));
        let result = read_loop(reader, &handle, &dispatcher).await;

        if let Err(e) = &result {
            tracing::error!(peer = %handle, error = %e, "read loop ended");
        }
        handle.advance(PeerState::Closed);
        write_task.abort();
        // Wait for the abort so the write half is dropped before we return.
        let _ = write_task.await;
        handle.unlink();

        result
    }
}

async fn read_loop<H: PacketHandler>(
    mut reader: OwnedReadHalf,
    handle: &PeerHandle,
    dispatcher: &Dispatcher<H>,
) -> Result<(), TransportError> {
    let mut buf = [0u8; FRAME_LEN];
    while handle.is_active() {
        tokio::select! {
            read = reader.read_exact(&mut buf) => {
                read.map_err(TransportError::ConnectionLost)?;
                dispatcher.dispatch(handle, &buf)?;
            }
            _ = handle.inactive() => break,
        }
    }
    Ok(())
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    handle: PeerHandle,
) {
    while let Some(frame) = outbound.recv().await {
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let e = TransportError::SendFailed(e);
            tracing::warn!(peer = %handle, error = %e, "write loop stopped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(id: u64) -> (PeerHandle, mpsc::UnboundedReceiver<Frame>) {
        PeerHandle::new(
            Some(PeerId::new(id)),
            format!("test-{id}"),
            StatusFlags::SUPPORTS_WANT_DISCONNECT,
        )
    }

    #[test]
    fn test_new_handle_is_handshaking() {
        let (peer, _rx) = detached(1);
        assert_eq!(peer.state(), PeerState::Handshaking);
        assert!(peer.is_active());
        assert_eq!(peer.peer_status(), None);
        assert_eq!(peer.to_string(), "peer-1 (test-1)");
    }

    #[test]
    fn test_send_preserves_order() {
        let (peer, mut rx) = detached(1);
        for i in 0..5u8 {
            peer.send([i; FRAME_LEN]);
        }
        for i in 0..5u8 {
            assert_eq!(rx.try_recv().unwrap(), [i; FRAME_LEN]);
        }
    }

    #[test]
    fn test_send_to_inactive_peer_is_dropped() {
        let (peer, mut rx) = detached(1);
        peer.close();
        assert!(!peer.is_active());
        peer.send([0x6C; FRAME_LEN]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (peer, rx) = detached(1);
        drop(rx);
        peer.send([0x6A; FRAME_LEN]);
    }

    #[test]
    fn test_state_never_moves_backwards() {
        let (peer, _rx) = detached(1);
        peer.advance(PeerState::Closed);
        peer.advance(PeerState::Active);
        assert_eq!(peer.state(), PeerState::Closed);
    }

    #[test]
    fn test_handles_compare_by_identity() {
        let (a, _ra) = detached(1);
        let (b, _rb) = detached(1);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_link_sends_own_status_when_peer_status_unknown() {
        let (a, _ra) = detached(1);
        let (b, mut rb) = detached(2);

        a.link_to(&b);
        assert_eq!(a.linked(), Some(b.clone()));
        assert_eq!(rb.try_recv().unwrap(), [0x6C, 0x04, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_link_prefers_recorded_peer_status() {
        let (a, _ra) = detached(1);
        let (b, mut rb) = detached(2);

        a.record_peer_status(StatusFlags::RUNNING | StatusFlags::PAUSED);
        a.link_to(&b);
        assert_eq!(rb.try_recv().unwrap(), [0x6C, 0x03, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_link_cleared_when_target_goes_inactive() {
        let (a, _ra) = detached(1);
        let (b, _rb) = detached(2);

        a.link_to(&b);
        b.close();

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while a.linked().is_some() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("link should be cleared");
    }

    #[tokio::test]
    async fn test_stale_watcher_does_not_clear_new_link() {
        let (a, _ra) = detached(1);
        let (b, _rb) = detached(2);
        let (c, _rc) = detached(3);

        a.link_to(&b);
        a.link_to(&c);
        b.close();

        // Let the watcher for `b` run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(a.linked(), Some(c));
    }

    #[tokio::test]
    async fn test_link_to_self_is_refused() {
        let (a, mut ra) = detached(1);
        a.link_to(&a);
        assert!(a.linked().is_none());
        assert!(ra.try_recv().is_err());
    }
}
