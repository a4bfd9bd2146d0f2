//! BGB link connections.
//!
//! Provides the pieces every endpoint is built from:
//!
//! - [`Peer`] / [`PeerHandle`]: one TCP connection, its read and write
//!   loops, and the shared handle used to queue frames to it.
//! - [`Dispatcher`] / [`PacketHandler`]: the handshake rules and the
//!   per-packet callbacks.
//! - [`RelayHandler`]: a handler decorator that forwards link traffic
//!   between two linked peers (proxy mode).

mod dispatch;
mod error;
mod peer;
mod relay;

pub use dispatch::{Dispatcher, LoggingHandler, PacketHandler};
pub use error::TransportError;
pub use peer::{Peer, PeerHandle, PeerState};
pub use relay::RelayHandler;

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a std mutex, ignoring poisoning.
///
/// Every mutex in these crates guards plain data that a panicking
/// writer cannot leave half-updated. Shared with the `bgblink` crate's
/// registry and client slot.
#[doc(hidden)]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server-assigned connection identifier.
///
/// Allocated from a counter starting at 0 and never reused within one
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a new `PeerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}
