//! Unified error type for the bgblink crates.

use bgblink_peer::{PeerId, TransportError};
use bgblink_protocol::ProtocolError;

/// Top-level error that wraps all crate-specific errors.
///
/// Per-connection failures (bad frames, version mismatch, lost sockets)
/// end that connection and are logged; they never surface here. What
/// does surface is what the caller of a client or server operation can
/// act on.
#[derive(Debug, thiserror::Error)]
pub enum BgbLinkError {
    /// A transport-level error (bind, connect, accept).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, unknown command).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A unicast or link named an id that is not registered.
    #[error("no connection registered as {0}")]
    UnregisteredTarget(PeerId),

    /// `connect` was called on a client that already has a live connection.
    #[error("client is already connected")]
    AlreadyConnected,
}
