//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. A
//! `ProtocolError` always means the bytes themselves were wrong, never
//! the socket they came from.

use crate::FRAME_LEN;

/// Errors that can occur while turning bytes into packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer was not exactly one frame long.
    ///
    /// Every BGB link frame is [`FRAME_LEN`] bytes. Anything shorter or
    /// longer is a framing problem, usually a peer that is not speaking
    /// this protocol at all.
    #[error("framing error: expected {expected} bytes, got {actual}")]
    Framing { expected: usize, actual: usize },

    /// The command byte (`b0`) is not one of the known commands.
    ///
    /// The frame is rejected before any handler runs.
    #[error("unknown command byte {0:#04x}")]
    UnknownCommand(u8),
}

impl ProtocolError {
    /// Builds a framing error for a buffer of `actual` bytes.
    pub fn framing(actual: usize) -> Self {
        Self::Framing {
            expected: FRAME_LEN,
            actual,
        }
    }
}
