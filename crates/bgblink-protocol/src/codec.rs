//! Frame codec.
//!
//! A [`FrameCodec`] turns byte buffers into [`Packet`]s and back. It
//! carries the endpoint's [`Defines`] so the packets it builds on its
//! own (the Version announcement and the Status reply) use the right
//! version and status bits without any global state.

use crate::{
    Defines, Frame, Packet, ProtocolError, RawFrame, StatusFlags,
    StatusPacket, VersionPacket, FRAME_LEN,
};

/// Encodes and decodes BGB link frames.
///
/// The codec is `Copy`: it is just the constants table, so each
/// dispatcher keeps its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCodec {
    defines: Defines,
}

impl FrameCodec {
    pub const fn new(defines: Defines) -> Self {
        Self { defines }
    }

    /// The constants table this codec was built with.
    pub const fn defines(&self) -> &Defines {
        &self.defines
    }

    /// Decodes one frame.
    ///
    /// # Errors
    /// - [`ProtocolError::Framing`] if `data` is not exactly
    ///   [`FRAME_LEN`] bytes.
    /// - [`ProtocolError::UnknownCommand`] if the command byte is not
    ///   recognized.
    pub fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError> {
        let frame: &Frame = data
            .try_into()
            .map_err(|_| ProtocolError::framing(data.len()))?;
        Packet::from_raw(&RawFrame::from_bytes(frame))
    }

    /// Encodes one packet. Always [`FRAME_LEN`] bytes.
    pub fn encode(&self, packet: &Packet) -> Frame {
        packet.encode()
    }

    /// The Version packet announcing this endpoint's protocol version.
    pub fn version_packet(&self) -> Packet {
        Packet::Version(VersionPacket::from_defines(&self.defines))
    }

    /// A Status packet carrying `status`.
    pub fn status_packet(&self, status: StatusFlags) -> Packet {
        Packet::Status(StatusPacket::new(status))
    }

    /// A Status packet carrying this endpoint's own status bits.
    pub fn own_status_packet(&self) -> Packet {
        self.status_packet(self.defines.own_status)
    }
}
