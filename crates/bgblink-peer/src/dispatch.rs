//! Per-connection packet dispatch.
//!
//! The [`Dispatcher`] owns the handshake rules that every connection
//! follows (version check, status reply, remembering the remote status)
//! and then hands each packet to a [`PacketHandler`]. Behavior is
//! composed by wrapping handlers, not by overriding: a relay is a
//! [`RelayHandler`](crate::RelayHandler) around whatever handler would
//! otherwise run.

use bgblink_protocol::{
    Defines, Frame, FrameCodec, JoypadPacket, Packet, ProtocolError,
    StatusPacket, Sync1Packet, Sync2Packet, Sync3Packet, VersionPacket,
    WantDisconnectPacket,
};

use crate::{PeerHandle, PeerState};

/// Reactions to each packet kind.
///
/// Every method receives the connection the packet arrived on, the
/// decoded packet, and the exact 8 bytes that were read, so a handler
/// can forward the frame without re-encoding it.
///
/// All methods default to logging the packet at `debug` and doing
/// nothing else. Handlers run inside the read loop: they must not block.
pub trait PacketHandler: Send + Sync + 'static {
    /// Called after the built-in version check.
    fn on_version(&self, peer: &PeerHandle, packet: &VersionPacket, frame: &Frame) {
        let _ = packet;
        log_frame(peer, "Version", frame);
    }

    fn on_joypad(&self, peer: &PeerHandle, packet: &JoypadPacket, frame: &Frame) {
        let _ = packet;
        log_frame(peer, "Joypad", frame);
    }

    fn on_sync1(&self, peer: &PeerHandle, packet: &Sync1Packet, frame: &Frame) {
        let _ = packet;
        log_frame(peer, "Sync1", frame);
    }

    fn on_sync2(&self, peer: &PeerHandle, packet: &Sync2Packet, frame: &Frame) {
        let _ = packet;
        log_frame(peer, "Sync2", frame);
    }

    fn on_sync3(&self, peer: &PeerHandle, packet: &Sync3Packet, frame: &Frame) {
        let _ = packet;
        log_frame(peer, "Sync3", frame);
    }

    /// Called after the status has been recorded on `peer`.
    fn on_status(&self, peer: &PeerHandle, packet: &StatusPacket, frame: &Frame) {
        let _ = packet;
        log_frame(peer, "Status", frame);
    }

    fn on_want_disconnect(
        &self,
        peer: &PeerHandle,
        packet: &WantDisconnectPacket,
        frame: &Frame,
    ) {
        let _ = packet;
        log_frame(peer, "WantDisconnect", frame);
    }
}

fn log_frame(peer: &PeerHandle, kind: &'static str, frame: &Frame) {
    tracing::debug!(
        %peer,
        kind,
        b0 = frame[0],
        b1 = frame[1],
        b2 = frame[2],
        b3 = frame[3],
        i0 = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]),
        "received packet"
    );
}

/// The base handler: log every packet, react to none.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl PacketHandler for LoggingHandler {}

/// Decodes frames for one endpoint and routes them to a handler.
///
/// Shared by every connection of a server (wrap it in an `Arc`); all
/// per-connection state lives on the [`PeerHandle`].
#[derive(Debug)]
pub struct Dispatcher<H> {
    codec: FrameCodec,
    handler: H,
}

impl<H: PacketHandler> Dispatcher<H> {
    pub fn new(defines: Defines, handler: H) -> Self {
        Self {
            codec: FrameCodec::new(defines),
            handler,
        }
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    pub fn defines(&self) -> &Defines {
        self.codec.defines()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Decodes one frame received on `peer` and reacts to it.
    ///
    /// Returns the decoded packet.
    ///
    /// # Errors
    /// Returns the codec's error for a wrong-length buffer or an unknown
    /// command byte. Nothing is dispatched in that case.
    pub fn dispatch(
        &self,
        peer: &PeerHandle,
        data: &[u8],
    ) -> Result<Packet, ProtocolError> {
        let frame: &Frame = data
            .try_into()
            .map_err(|_| ProtocolError::framing(data.len()))?;
        let packet = self.codec.decode(frame)?;

        match &packet {
            Packet::Version(p) => {
                self.check_version(peer, p);
                self.handler.on_version(peer, p, frame);
            }
            Packet::Joypad(p) => self.handler.on_joypad(peer, p, frame),
            Packet::Sync1(p) => self.handler.on_sync1(peer, p, frame),
            Packet::Sync2(p) => self.handler.on_sync2(peer, p, frame),
            Packet::Sync3(p) => self.handler.on_sync3(peer, p, frame),
            Packet::Status(p) => {
                peer.record_peer_status(p.status);
                self.handler.on_status(peer, p, frame);
            }
            Packet::WantDisconnect(p) => {
                self.handler.on_want_disconnect(peer, p, frame)
            }
        }

        Ok(packet)
    }

    /// Handshake step: a matching version activates the connection and
    /// answers with our status; a mismatch marks it for shutdown.
    fn check_version(&self, peer: &PeerHandle, packet: &VersionPacket) {
        let defines = self.codec.defines();
        if !defines.accepts_version(packet.major, packet.minor) {
            tracing::error!(
                %peer,
                major = packet.major,
                minor = packet.minor,
                expected_major = defines.major,
                expected_minor = defines.minor,
                "incompatible protocol version"
            );
            peer.advance(PeerState::Closing);
            return;
        }

        peer.advance(PeerState::Active);
        peer.send_packet(&self.codec.status_packet(peer.own_status()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bgblink_protocol::{Command, StatusFlags, FRAME_LEN};
    use tokio::sync::mpsc;

    use super::*;
    use crate::PeerId;

    fn detached() -> (PeerHandle, mpsc::UnboundedReceiver<Frame>) {
        PeerHandle::new(
            Some(PeerId::new(0)),
            "test",
            StatusFlags::SUPPORTS_WANT_DISCONNECT,
        )
    }

    /// Records the command of every packet it sees.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Command>>,
    }

    impl PacketHandler for Recorder {
        fn on_version(&self, _: &PeerHandle, _: &VersionPacket, _: &Frame) {
            self.seen.lock().unwrap().push(Command::Version);
        }
        fn on_joypad(&self, _: &PeerHandle, _: &JoypadPacket, _: &Frame) {
            self.seen.lock().unwrap().push(Command::Joypad);
        }
        fn on_status(&self, _: &PeerHandle, _: &StatusPacket, _: &Frame) {
            self.seen.lock().unwrap().push(Command::Status);
        }
    }

    #[test]
    fn test_matching_version_activates_and_replies_with_status() {
        let dispatcher = Dispatcher::new(Defines::BGB_1_4, LoggingHandler);
        let (peer, mut rx) = detached();

        dispatcher
            .dispatch(&peer, &[0x01, 0x01, 0x04, 0, 0, 0, 0, 0])
            .unwrap();

        assert_eq!(peer.state(), PeerState::Active);
        assert_eq!(rx.try_recv().unwrap(), [0x6C, 0x04, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_version_mismatch_closes_without_status() {
        let dispatcher = Dispatcher::new(Defines::BGB_1_4, LoggingHandler);
        let (peer, mut rx) = detached();

        dispatcher
            .dispatch(&peer, &[0x01, 0x01, 0x05, 0, 0, 0, 0, 0])
            .unwrap();

        assert_eq!(peer.state(), PeerState::Closing);
        assert!(!peer.is_active());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_status_is_recorded() {
        let dispatcher = Dispatcher::new(Defines::BGB_1_4, LoggingHandler);
        let (peer, _rx) = detached();

        dispatcher
            .dispatch(&peer, &[0x6C, 0x05, 0, 0, 0, 0, 0, 0])
            .unwrap();

        let status = peer.peer_status().unwrap();
        assert!(status.is_running());
        assert!(status.supports_want_disconnect());
    }

    #[test]
    fn test_handler_sees_packets_in_order() {
        let dispatcher = Dispatcher::new(Defines::BGB_1_4, Recorder::default());
        let (peer, _rx) = detached();

        for frame in [
            [0x01, 0x01, 0x04, 0, 0, 0, 0, 0],
            [0x6C, 0x04, 0, 0, 0, 0, 0, 0],
            [0x65, 0x0B, 0, 0, 0, 0, 0, 0],
        ] {
            dispatcher.dispatch(&peer, &frame).unwrap();
        }

        assert_eq!(
            *dispatcher.handler().seen.lock().unwrap(),
            vec![Command::Version, Command::Status, Command::Joypad]
        );
    }

    #[test]
    fn test_unknown_command_is_not_dispatched() {
        let dispatcher = Dispatcher::new(Defines::BGB_1_4, Recorder::default());
        let (peer, _rx) = detached();

        let err = dispatcher
            .dispatch(&peer, &[0x70, 0, 0, 0, 0, 0, 0, 0])
            .unwrap_err();

        assert_eq!(err, ProtocolError::UnknownCommand(0x70));
        assert!(dispatcher.handler().seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_wrong_length_is_framing_error() {
        let dispatcher = Dispatcher::new(Defines::BGB_1_4, LoggingHandler);
        let (peer, _rx) = detached();

        let err = dispatcher.dispatch(&peer, &[0x65, 0x0B, 0]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Framing {
                expected: FRAME_LEN,
                actual: 3,
            }
        );
    }
}
