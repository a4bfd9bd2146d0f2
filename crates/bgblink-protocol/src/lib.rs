//! Wire protocol for BGB link cable emulation.
//!
//! This crate defines the bytes two emulators exchange over TCP:
//!
//! - **Constants** ([`Command`], [`Button`], [`StatusFlags`], [`Defines`]):
//!   fixed wire values and the per-endpoint version table.
//! - **Types** ([`RawFrame`], [`Packet`] and one struct per kind):
//!   typed views over the 8-byte frame.
//! - **Codec** ([`FrameCodec`]): buffer to packet and back.
//! - **Errors** ([`ProtocolError`]): what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets. It sits under the
//! peer layer, which reads frames off a connection and hands them here.
//!
//! ```text
//! Peer (socket, 8-byte reads) → Protocol (Packet) → Handler callbacks
//! ```

mod codec;
mod defines;
mod error;
mod types;

pub use codec::FrameCodec;
pub use defines::{Button, Command, Defines, StatusFlags};
pub use error::ProtocolError;
pub use types::{
    Frame, JoypadPacket, Packet, RawFrame, StatusPacket, Sync1Packet,
    Sync2Packet, Sync3Packet, VersionPacket, WantDisconnectPacket,
    FRAME_LEN,
};
