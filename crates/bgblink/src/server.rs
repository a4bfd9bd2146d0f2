//! `BgbServer` builder, accept loop, and connection registry.
//!
//! The server accepts any number of emulators, gives each connection a
//! [`PeerId`], and lets the caller address them one at a time, all at
//! once, or all but one. A proxy server additionally relays link
//! traffic between pairs of connections.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bgblink_peer::{
    lock, Dispatcher, LoggingHandler, PacketHandler, Peer, PeerHandle, PeerId,
    RelayHandler, TransportError,
};
use bgblink_protocol::{Defines, Frame, Packet};
use tokio::net::{TcpListener, TcpStream};

use crate::{BgbLinkError, LinkConfig};

/// Who a server-side send is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every registered connection.
    All,
    /// Exactly one connection.
    Peer(PeerId),
    /// Every registered connection except this one.
    AllExcept(PeerId),
}

/// A server whose connections relay link traffic to their linked peer.
pub type ProxyServer = BgbServer<RelayHandler<LoggingHandler>>;

/// Shared server state.
///
/// `next_id` is behind an async mutex so concurrent accepts never hand
/// out the same id. `peers` uses a std mutex: it is never held across
/// an `.await`, and keeping it synchronous lets handlers (which run
/// inside read loops) address other connections.
struct ServerState<H> {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<H>>,
    next_id: tokio::sync::Mutex<u64>,
    peers: Mutex<HashMap<PeerId, PeerHandle>>,
    pair_connections: bool,
}

/// Removes a connection from the registry when its handler task exits,
/// including by panic.
struct RegistryGuard<H> {
    id: PeerId,
    state: Arc<ServerState<H>>,
}

impl<H> Drop for RegistryGuard<H> {
    fn drop(&mut self) {
        lock(&self.state.peers).remove(&self.id);
    }
}

/// Builder for configuring and binding a [`BgbServer`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), bgblink::BgbLinkError> {
/// use bgblink::prelude::*;
///
/// let server = BgbServer::builder()
///     .bind("127.0.0.1:12800")
///     .build(LoggingHandler)
///     .await?;
/// let accept = server.clone();
/// tokio::spawn(async move { accept.start().await });
///
/// server.broadcast(Packet::from(JoypadPacket::new(Button::Down, true)).encode());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BgbServerBuilder {
    config: LinkConfig,
}

impl BgbServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(LinkConfig::default())
    }

    pub fn from_config(config: LinkConfig) -> Self {
        Self { config }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the protocol constants the server speaks with.
    pub fn defines(mut self, defines: Defines) -> Self {
        self.config.defines = defines;
        self
    }

    /// Proxy servers: link each new connection with a waiting one.
    pub fn pair_connections(mut self, enabled: bool) -> Self {
        self.config.pair_connections = enabled;
        self
    }

    /// Binds the listening socket. Connections are handled by `handler`.
    pub async fn build<H: PacketHandler>(
        self,
        handler: H,
    ) -> Result<BgbServer<H>, BgbLinkError> {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr = %self.config.bind_addr, "BGB link server bound");

        let state = Arc::new(ServerState {
            listener,
            dispatcher: Arc::new(Dispatcher::new(self.config.defines, handler)),
            next_id: tokio::sync::Mutex::new(0),
            peers: Mutex::new(HashMap::new()),
            pair_connections: self.config.pair_connections,
        });

        Ok(BgbServer { state })
    }

    /// Binds a proxy server: link traffic is relayed between linked
    /// connections.
    pub async fn build_proxy(self) -> Result<ProxyServer, BgbLinkError> {
        self.build(RelayHandler::new(LoggingHandler)).await
    }
}

impl Default for BgbServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound BGB link server.
///
/// Cheap to clone: clones share the listener and the registry, so one
/// clone can run [`start`](Self::start) while others send.
pub struct BgbServer<H = LoggingHandler> {
    state: Arc<ServerState<H>>,
}

impl<H> Clone for BgbServer<H> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl BgbServer<LoggingHandler> {
    /// Creates a new builder.
    pub fn builder() -> BgbServerBuilder {
        BgbServerBuilder::new()
    }
}

impl<H: PacketHandler> BgbServer<H> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.state.listener.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Each accepted socket gets the next id and its own task, which
    /// drives the connection to completion and then removes it from the
    /// registry. A failing connection never affects the others. Runs
    /// until the task is dropped.
    pub async fn start(&self) -> Result<(), BgbLinkError> {
        tracing::info!(addr = ?self.local_addr().ok(), "BGB link server running");

        loop {
            match self.state.listener.accept().await {
                Ok((stream, _)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(serve_connection(state, stream));
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }

    /// Sends an encoded frame.
    ///
    /// - `target = None`: every registered connection.
    /// - `target = Some(id)`, `invert = true`: every connection except `id`.
    /// - `target = Some(id)`, `invert = false`: only `id`.
    ///
    /// # Errors
    /// [`BgbLinkError::UnregisteredTarget`] for a unicast to an id that is
    /// not registered.
    pub fn send(
        &self,
        frame: Frame,
        target: Option<PeerId>,
        invert: bool,
    ) -> Result<(), BgbLinkError> {
        let recipient = match (target, invert) {
            (None, _) => Recipient::All,
            (Some(id), true) => Recipient::AllExcept(id),
            (Some(id), false) => Recipient::Peer(id),
        };
        self.deliver(frame, recipient)
    }

    /// Sends an encoded frame to `recipient`. See [`send`](Self::send).
    pub fn deliver(
        &self,
        frame: Frame,
        recipient: Recipient,
    ) -> Result<(), BgbLinkError> {
        match recipient {
            Recipient::Peer(id) => {
                let peer = self.peer(id).ok_or(BgbLinkError::UnregisteredTarget(id))?;
                peer.send(frame);
            }
            Recipient::All => {
                for peer in self.snapshot() {
                    peer.send(frame);
                }
            }
            Recipient::AllExcept(excluded) => {
                for peer in self.snapshot() {
                    if peer.id() != Some(excluded) {
                        peer.send(frame);
                    }
                }
            }
        }
        Ok(())
    }

    /// Sends to every registered connection.
    pub fn broadcast(&self, frame: Frame) {
        for peer in self.snapshot() {
            peer.send(frame);
        }
    }

    /// Encodes and sends a packet. See [`deliver`](Self::deliver).
    pub fn send_packet(
        &self,
        packet: &Packet,
        recipient: Recipient,
    ) -> Result<(), BgbLinkError> {
        self.deliver(packet.encode(), recipient)
    }

    /// Looks up a registered connection.
    pub fn peer(&self, id: PeerId) -> Option<PeerHandle> {
        lock(&self.state.peers).get(&id).cloned()
    }

    /// Ids of every registered connection, ascending.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = lock(&self.state.peers).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of currently registered connections.
    pub fn peer_count(&self) -> usize {
        lock(&self.state.peers).len()
    }

    /// Links two registered connections both ways.
    ///
    /// On a proxy server this starts relaying link traffic between them.
    ///
    /// # Errors
    /// [`BgbLinkError::UnregisteredTarget`] if either id is not registered.
    pub fn link(&self, a: PeerId, b: PeerId) -> Result<(), BgbLinkError> {
        let pa = self.peer(a).ok_or(BgbLinkError::UnregisteredTarget(a))?;
        let pb = self.peer(b).ok_or(BgbLinkError::UnregisteredTarget(b))?;
        pa.link_to(&pb);
        pb.link_to(&pa);
        Ok(())
    }

    fn snapshot(&self) -> Vec<PeerHandle> {
        lock(&self.state.peers).values().cloned().collect()
    }
}

impl<H> ServerState<H> {
    async fn allocate_id(&self) -> PeerId {
        let mut next = self.next_id.lock().await;
        let id = PeerId::new(*next);
        *next += 1;
        id
    }

    /// Registers `handle`, linking it with a waiting unlinked connection
    /// first when pairing is enabled.
    fn register(&self, handle: &PeerHandle, id: PeerId) {
        let mut peers = lock(&self.peers);
        if self.pair_connections {
            let waiting = peers
                .values()
                .filter(|p| p.is_active() && p.linked().is_none())
                .min_by_key(|p| p.id())
                .cloned();
            if let Some(waiting) = waiting {
                waiting.link_to(handle);
                handle.link_to(&waiting);
            }
        }
        peers.insert(id, handle.clone());
    }
}

/// Handles a single connection from accept to close.
async fn serve_connection<H: PacketHandler>(
    state: Arc<ServerState<H>>,
    stream: TcpStream,
) {
    let id = state.allocate_id().await;
    let peer = Peer::new(stream, Some(id), Arc::clone(&state.dispatcher));
    let handle = peer.handle().clone();

    state.register(&handle, id);
    let _guard = RegistryGuard {
        id,
        state: Arc::clone(&state),
    };
    tracing::info!(peer = %handle, "client connected");

    if let Err(e) = peer.run().await {
        tracing::debug!(peer = %handle, error = %e, "connection ended with error");
    }

    tracing::info!(peer = %handle, "client disconnected");
    // _guard drops here → registry entry removed.
}
