//! `BgbClient`: dials one emulator and keeps a single connection.

use std::io::ErrorKind;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bgblink_peer::{
    lock, Dispatcher, LoggingHandler, PacketHandler, Peer, PeerHandle,
    RelayHandler, TransportError,
};
use bgblink_protocol::{Frame, Packet};
use tokio::net::TcpStream;

use crate::{BgbLinkError, LinkConfig};

/// A client whose connection relays link traffic to its linked peer.
pub type ProxyClient = BgbClient<RelayHandler<LoggingHandler>>;

struct ClientState<H> {
    dispatcher: Arc<Dispatcher<H>>,
    retry_delay: Duration,
    peer: Mutex<Option<PeerHandle>>,
}

/// Clears the client's connection slot when `connect` returns or is
/// cancelled, unless a newer connection has taken the slot since.
struct SlotGuard<'a> {
    slot: &'a Mutex<Option<PeerHandle>>,
    handle: PeerHandle,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if slot.as_ref() == Some(&self.handle) {
            *slot = None;
        }
    }
}

/// A BGB link client.
///
/// Cheap to clone: clones share the connection, so one clone can sit
/// in [`connect`](Self::connect) while others [`send`](Self::send).
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), bgblink::BgbLinkError> {
/// use bgblink::prelude::*;
///
/// let client = BgbClient::new(LoggingHandler);
/// let driver = client.clone();
/// tokio::spawn(async move { driver.connect("127.0.0.1", 12800).await });
///
/// client.send(Packet::from(JoypadPacket::new(Button::A, true)).encode());
/// # Ok(())
/// # }
/// ```
pub struct BgbClient<H = LoggingHandler> {
    state: Arc<ClientState<H>>,
}

impl<H> Clone for BgbClient<H> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<H: PacketHandler> BgbClient<H> {
    /// Creates a client with the default configuration.
    pub fn new(handler: H) -> Self {
        Self::with_config(&LinkConfig::default(), handler)
    }

    pub fn with_config(config: &LinkConfig, handler: H) -> Self {
        Self {
            state: Arc::new(ClientState {
                dispatcher: Arc::new(Dispatcher::new(config.defines, handler)),
                retry_delay: config.retry_delay,
                peer: Mutex::new(None),
            }),
        }
    }

    /// Connects and drives the connection until it ends.
    ///
    /// While the remote end refuses the connection, waits the configured
    /// retry delay and dials again, with no limit: the emulator on the
    /// other side may simply not be started yet. Once connected, returns
    /// only when the connection is gone, after which `connect` can be
    /// called again.
    ///
    /// # Errors
    /// - [`BgbLinkError::AlreadyConnected`] if this client already has a
    ///   live connection.
    /// - [`BgbLinkError::Transport`] for dial failures other than refusal
    ///   (unresolvable host, unreachable network).
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), BgbLinkError> {
        if self.is_connected() {
            return Err(BgbLinkError::AlreadyConnected);
        }

        let addr = format!("{host}:{port}");
        let stream = loop {
            tracing::info!(%addr, "connecting to server");
            match TcpStream::connect(&addr).await {
                Ok(stream) => break stream,
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    tracing::info!(
                        %addr,
                        retry_in = ?self.state.retry_delay,
                        "connection refused, trying again"
                    );
                    tokio::time::sleep(self.state.retry_delay).await;
                }
                Err(e) => return Err(TransportError::ConnectFailed(e).into()),
            }
        };

        let peer = Peer::new(stream, None, Arc::clone(&self.state.dispatcher));
        let handle = peer.handle().clone();
        {
            let mut slot = lock(&self.state.peer);
            if slot.as_ref().is_some_and(PeerHandle::is_active) {
                return Err(BgbLinkError::AlreadyConnected);
            }
            *slot = Some(handle.clone());
        }
        let _guard = SlotGuard {
            slot: &self.state.peer,
            handle: handle.clone(),
        };
        tracing::info!(peer = %handle, "client connected to server");

        if let Err(e) = peer.run().await {
            tracing::debug!(peer = %handle, error = %e, "connection ended with error");
        }

        tracing::info!(peer = %handle, "client disconnected from server");
        Ok(())
    }

    /// Queues an encoded frame, or drops it if not connected.
    pub fn send(&self, frame: Frame) {
        if let Some(peer) = self.peer() {
            peer.send(frame);
        }
    }

    /// Encodes and queues a packet. Same contract as [`send`](Self::send).
    pub fn send_packet(&self, packet: &Packet) {
        self.send(packet.encode());
    }

    /// The live connection, if any.
    pub fn peer(&self) -> Option<PeerHandle> {
        lock(&self.state.peer).clone()
    }

    pub fn is_connected(&self) -> bool {
        self.peer().is_some_and(|peer| peer.is_active())
    }
}

impl ProxyClient {
    /// Creates a client whose connection relays link traffic once linked.
    pub fn proxy(config: &LinkConfig) -> Self {
        Self::with_config(config, RelayHandler::new(LoggingHandler))
    }
}

#[cfg(test)]
mod tests {
    use bgblink_protocol::StatusFlags;

    use super::*;

    fn handle(name: &str) -> PeerHandle {
        PeerHandle::new(None, name, StatusFlags::SUPPORTS_WANT_DISCONNECT).0
    }

    #[test]
    fn test_slot_guard_clears_own_handle() {
        let slot = Mutex::new(None);
        let first = handle("first");
        *lock(&slot) = Some(first.clone());

        drop(SlotGuard {
            slot: &slot,
            handle: first,
        });
        assert!(lock(&slot).is_none());
    }

    #[test]
    fn test_slot_guard_keeps_newer_handle() {
        let slot = Mutex::new(None);
        let stale = handle("stale");
        let current = handle("current");
        *lock(&slot) = Some(current.clone());

        drop(SlotGuard {
            slot: &slot,
            handle: stale,
        });
        assert_eq!(*lock(&slot), Some(current));
    }
}
