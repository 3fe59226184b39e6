//! chatsync terminal client.
//!
//! # Usage
//!
//! ```bash
//! # Token from a file, local backend
//! chatsync --token-file ~/.chatsync/token
//!
//! # Remote backend
//! chatsync --api-url https://chat.example.com --broker-url wss://chat.example.com/ws \
//!     --token-file ~/.chatsync/token
//! ```
//!
//! Type text to send it, `/open <id>` to switch conversation, `/new` to
//! start one, `/logout` to discard the token and `/quit` to leave.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chatsync_app::Runtime;
use chatsync_cli::{CliError, NetDriver};
use chatsync_client::{
    CredentialStore, FileCredentialStore, SessionConfig, SystemEnv, transport::HttpBackend,
};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// chatsync terminal client
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(about = "Realtime chat session client")]
#[command(version)]
struct Args {
    /// Base URL of the HTTP API
    #[arg(long, env = "CHATSYNC_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// WebSocket endpoint of the message broker
    #[arg(long, env = "CHATSYNC_BROKER_URL", default_value = "ws://localhost:8080/ws")]
    broker_url: String,

    /// File holding the bearer token
    #[arg(long, env = "CHATSYNC_TOKEN_FILE")]
    token_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CHATSYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Delay before reopening a lost link, in milliseconds
    #[arg(long, default_value = "5000")]
    reconnect_delay_ms: u64,

    /// Messages per history page
    #[arg(long, default_value = "50")]
    page_size: u32,

    /// Messages shown per render
    #[arg(long, default_value = "20")]
    timeline: usize,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.broker_url.clone());
        config.reconnect_delay = Duration::from_millis(self.reconnect_delay_ms);
        config.history_page_size = self.page_size;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout belongs to the rendering.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Read again at every connection attempt, so the file may be refreshed while running.
    let store = Arc::new(FileCredentialStore::new(&args.token_file));
    if store.load().is_none() {
        return Err(CliError::NoCredential { path: args.token_file.clone() });
    }

    tracing::info!(api = %args.api_url, broker = %args.broker_url, "chatsync starting");

    let http = HttpBackend::new(&args.api_url, store.clone())?;
    let driver = NetDriver::new(http, store.clone(), args.timeline);
    Runtime::new(driver, SystemEnv::new(), args.session_config(), store).run().await?;

    tracing::info!("chatsync stopped");
    Ok(())
}
