//! Endpoint configuration.

use std::time::Duration;

use bgblink_protocol::Defines;
use serde::{Deserialize, Serialize};

/// Settings shared by clients and servers.
///
/// Every field has a default, so a partial JSON document (or `{}`)
/// deserializes into a usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Address a server listens on.
    pub bind_addr: String,

    /// Delay between dial attempts while the remote end refuses.
    pub retry_delay: Duration,

    /// Protocol version and status bits this endpoint speaks with.
    pub defines: Defines,

    /// Proxy servers only: link each new connection with a waiting
    /// unlinked one, so pairs of emulators are relayed without the
    /// caller linking them by hand.
    pub pair_connections: bool,
}

impl LinkConfig {
    /// Default port used by the sample setups (`bgb -listen 127.0.0.1:12800`).
    pub const DEFAULT_PORT: u16 = 12800;
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", Self::DEFAULT_PORT),
            retry_delay: Duration::from_secs(1),
            defines: Defines::BGB_1_4,
            pair_connections: false,
        }
    }
}
