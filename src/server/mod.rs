// Collector backend: room event relay and artifact uploads over HTTP
//
// Store-only: the server assigns ids and file names, appends, and never
// interprets what it stores.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::info;

mod events;
pub use events::{clamp_limit, AppendedEvent, EventStore, DEFAULT_LIMIT, MAX_LIMIT};

mod routes;
pub use routes::router;

mod sanitize;
pub use sanitize::{safe_room_id, sanitize_name, sanitize_participant, DEFAULT_ROOM};

mod uploads;
pub use uploads::{format_stamp, UploadKind, UploadMeta, UploadStore, MAX_COLLISION_SUFFIX};

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;

/// Errors that can occur in the file-based stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Too many name collisions for {0}")]
    TooManyCollisions(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Errors that stop the server itself
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared handler state
pub struct CollectorState {
    pub events: EventStore,
    pub uploads: UploadStore,
}

impl CollectorState {
    /// Stores rooted at `data_dir`
    pub fn new(data_dir: &Path) -> Self {
        Self {
            events: EventStore::new(data_dir),
            uploads: UploadStore::new(data_dir),
        }
    }
}

/// Bind `config.bind` and serve until `shutdown` fires
pub async fn serve(config: &ServerConfig, shutdown: CancellationToken) -> Result<(), ServerError> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.bind.clone(),
            source,
        })?;
    serve_on(listener, &config.data_dir, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_on(
    listener: TcpListener,
    data_dir: &Path,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    let state = Arc::new(CollectorState::new(data_dir));
    info!(
        "[server] listening on {} (data in {})",
        addr.map_or_else(|| "?".to_string(), |a| a.to_string()),
        data_dir.display()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("[server] stopped");
    Ok(())
}
