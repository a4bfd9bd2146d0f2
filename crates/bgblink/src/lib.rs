//! # bgblink
//!
//! Game Boy link cable emulation over TCP, speaking the BGB link
//! protocol (version 1.4) so it interoperates with BGB and other
//! emulators that implement it.
//!
//! Three roles are provided:
//!
//! - [`BgbClient`] dials one emulator (retrying until it is up) and
//!   keeps a single connection.
//! - [`BgbServer`] accepts many emulators and can address them one at a
//!   time, all at once, or all but one.
//! - Proxy mode ([`ProxyServer`], [`ProxyClient`]) links two connections
//!   and relays link traffic between them.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgblink::prelude::*;
//!
//! # async fn demo() -> Result<(), BgbLinkError> {
//! let server = BgbServer::builder()
//!     .bind("127.0.0.1:12800")
//!     .build(LoggingHandler)
//!     .await?;
//! server.start().await
//! # }
//! ```

mod client;
mod config;
mod error;
mod server;

pub use client::{BgbClient, ProxyClient};
pub use config::LinkConfig;
pub use error::BgbLinkError;
pub use server::{BgbServer, BgbServerBuilder, ProxyServer, Recipient};

pub use bgblink_peer::{
    Dispatcher, LoggingHandler, PacketHandler, PeerHandle, PeerId,
    PeerState, RelayHandler, TransportError,
};
pub use bgblink_protocol as protocol;

/// Everything a typical caller needs.
pub mod prelude {
    pub use crate::{
        BgbClient, BgbLinkError, BgbServer, BgbServerBuilder, LinkConfig,
        LoggingHandler, PacketHandler, PeerHandle, PeerId, PeerState,
        ProxyClient, ProxyServer, Recipient, RelayHandler,
    };
    pub use bgblink_protocol::{
        Button, Command, Defines, Frame, JoypadPacket, Packet, RawFrame,
        StatusFlags, StatusPacket, Sync1Packet, Sync2Packet, Sync3Packet,
        VersionPacket, WantDisconnectPacket,
    };
}

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling it
/// twice is harmless; the second call does nothing.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
