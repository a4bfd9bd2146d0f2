//! Sample harness for the link endpoints.
//!
//! ```text
//! link-demo server [--config link.json] [--addr IP:PORT]   press Down on every emulator
//! link-demo client [--config link.json] [--addr IP:PORT]   dial one emulator, press Down on it
//! link-demo proxy  [--config link.json] [--addr IP:PORT]   pair emulators and relay between them
//! ```
//!
//! Start BGB with `-listen 127.0.0.1:12800` for `client`, or point two
//! BGB instances at the `proxy`. The server and proxy listen on the
//! config's `bind_addr`; the client dials it. Ctrl-C exits with status 1
//! and a fatal error exits with status 2.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use bgblink::prelude::*;
use clap::{Parser, ValueEnum};

const PRESS_INTERVAL: Duration = Duration::from_secs(1);
const RELEASE_AFTER: Duration = Duration::from_millis(25);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Accept emulators and press Down on all of them.
    Server,
    /// Dial one emulator and press Down on it.
    Client,
    /// Pair emulators and relay link traffic between them.
    Proxy,
}

#[derive(Parser, Debug)]
#[command(name = "link-demo", about = "BGB link cable sample harness")]
struct Cli {
    /// Which endpoint to run.
    #[arg(value_enum)]
    mode: Mode,

    /// Path to a JSON `LinkConfig`. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (server, proxy) or dial (client). Overrides
    /// the config's `bind_addr`.
    #[arg(short, long)]
    addr: Option<SocketAddr>,
}

fn load_config(path: Option<&Path>) -> Result<LinkConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(LinkConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Final address for this run. A malformed `bind_addr` is an error, never
/// a silent fallback.
fn resolve_addr(
    config: &LinkConfig,
    cli_addr: Option<SocketAddr>,
) -> Result<SocketAddr, std::net::AddrParseError> {
    match cli_addr {
        Some(addr) => Ok(addr),
        None => config.bind_addr.parse(),
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

fn joypad(pressed: bool) -> Frame {
    Packet::from(JoypadPacket::new(Button::Down, pressed)).encode()
}

async fn run_server(config: LinkConfig) -> Result<(), BgbLinkError> {
    let server = BgbServerBuilder::from_config(config)
        .build(LoggingHandler)
        .await?;

    let presser = server.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRESS_INTERVAL);
        loop {
            ticker.tick().await;
            presser.broadcast(joypad(true));
            tokio::time::sleep(RELEASE_AFTER).await;
            presser.broadcast(joypad(false));
        }
    });

    server.start().await
}

async fn run_client(config: LinkConfig, target: SocketAddr) -> Result<(), BgbLinkError> {
    let client = BgbClient::with_config(&config, LoggingHandler);
    // `connect` joins host and port with a colon.
    let host = match target {
        SocketAddr::V4(v4) => v4.ip().to_string(),
        SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
    };

    let presser = client.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRESS_INTERVAL);
        loop {
            ticker.tick().await;
            presser.send(joypad(true));
            tokio::time::sleep(RELEASE_AFTER).await;
            presser.send(joypad(false));
        }
    });

    loop {
        client.connect(&host, target.port()).await?;
        tracing::info!("connection closed, reconnecting");
    }
}

async fn run_proxy(mut config: LinkConfig) -> Result<(), BgbLinkError> {
    config.pair_connections = true;
    let server = BgbServerBuilder::from_config(config).build_proxy().await?;
    server.start().await
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    bgblink::init_tracing();
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return ExitCode::from(2);
        }
    };
    let addr = match resolve_addr(&config, cli.addr) {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "invalid address");
            return ExitCode::from(2);
        }
    };
    config.bind_addr = addr.to_string();

    tracing::info!(mode = ?cli.mode, %addr, "starting link demo");
    let run = async move {
        match cli.mode {
            Mode::Server => run_server(config).await,
            Mode::Client => run_client(config, addr).await,
            Mode::Proxy => run_proxy(config).await,
        }
    };

    tokio::select! {
        result = run => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "fatal error");
                ExitCode::from(2)
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            ExitCode::from(1)
        }
    }
}
