//! Memosync reference server
//!
//! An in-memory memo server speaking the organizator memo API, for local
//! use and for trying out sync between several clients.
//!
//! # Configuration
//!
//! Environment variables:
//! - `MEMOSYNC_PORT`: Port to listen on (default: 8080)
//! - `MEMOSYNC_SERVER_CONFIG`: Path to config file (default: ~/.config/memosync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: 1
//!     username: "root"
//! memogroups:
//!   - id: 1
//!     name: "Home"
//! ```
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /organizator/memo/{id}`: Fetch a memo
//! - `POST /organizator/memo/`: Create, update or (with empty text) delete a memo
//! - `GET /organizator/memogroup/`: List memo groups

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memosync::clock::system_clock;
use memosync::server::{router, AppState, ServerConfigFile};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Path to config file
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("MEMOSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let config_path = std::env::var("MEMOSYNC_SERVER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("memosync-server")
                    .join("config.yaml")
            });

        Self { port, config_path }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memosync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("Config file: {}", config.config_path.display());

    let state = AppState::new(ServerConfigFile::load(&config.config_path), system_clock());
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
