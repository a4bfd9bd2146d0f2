//! Proxy relay.
//!
//! [`RelayHandler`] wraps another handler and, after it runs, forwards
//! link traffic to whatever peer the connection is linked to (see
//! [`PeerHandle::link_to`]). The received 8 bytes are forwarded as-is.
//!
//! Forwarded kinds: Sync1, Sync2, Sync3, Status, WantDisconnect.
//! Version is per-connection and Joypad is remote control of the local
//! emulator, so neither crosses the link.

use bgblink_protocol::{
    Frame, JoypadPacket, StatusPacket, Sync1Packet, Sync2Packet,
    Sync3Packet, VersionPacket, WantDisconnectPacket,
};

use crate::{LoggingHandler, PacketHandler, PeerHandle};

/// Decorator that relays link traffic to the linked peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayHandler<H = LoggingHandler> {
    inner: H,
}

impl<H: PacketHandler> RelayHandler<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

fn forward(peer: &PeerHandle, frame: &Frame) {
    if let Some(target) = peer.linked() {
        tracing::trace!(from = %peer, to = %target, b0 = frame[0], "relaying frame");
        target.send(*frame);
    }
}

impl<H: PacketHandler> PacketHandler for RelayHandler<H> {
    fn on_version(&self, peer: &PeerHandle, packet: &VersionPacket, frame: &Frame) {
        self.inner.on_version(peer, packet, frame);
    }

    fn on_joypad(&self, peer: &PeerHandle, packet: &JoypadPacket, frame: &Frame) {
        self.inner.on_joypad(peer, packet, frame);
    }

    fn on_sync1(&self, peer: &PeerHandle, packet: &Sync1Packet, frame: &Frame) {
        self.inner.on_sync1(peer, packet, frame);
        forward(peer, frame);
    }

    fn on_sync2(&self, peer: &PeerHandle, packet: &Sync2Packet, frame: &Frame) {
        self.inner.on_sync2(peer, packet, frame);
        forward(peer, frame);
    }

    fn on_sync3(&self, peer: &PeerHandle, packet: &Sync3Packet, frame: &Frame) {
        self.inner.on_sync3(peer, packet, frame);
        forward(peer, frame);
    }

    fn on_status(&self, peer: &PeerHandle, packet: &StatusPacket, frame: &Frame) {
        self.inner.on_status(peer, packet, frame);
        forward(peer, frame);
    }

    fn on_want_disconnect(
        &self,
        peer: &PeerHandle,
        packet: &WantDisconnectPacket,
        frame: &Frame,
    ) {
        self.inner.on_want_disconnect(peer, packet, frame);
        forward(peer, frame);
    }
}
