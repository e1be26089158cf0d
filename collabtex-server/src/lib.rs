//! Server core for a multi-user collaborative text-editing service.
//!
//! Three subsystems make up the core, wired together by [`serve`]:
//!
//! - [`document`]: the versioned text buffer and its OT-style rebase.
//! - [`registry`]: connections, identities, colors, and documents.
//! - [`dispatch`] / [`connection`]: the listener, per-connection reader
//!   tasks, the shared request queue, and the single dispatcher task that
//!   mutates state and broadcasts the result.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

pub mod connection;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod protocol;
pub mod registry;

use error::ServerError;
use registry::Registry;

/// Default port the server listens on when no override is given, per the
/// `server [port]` CLI grammar.
pub const DEFAULT_PORT: u16 = 4444;

/// Binds a TCP listener on `port` and runs the server until the accept loop
/// fails or the process is killed. Never returns under normal operation;
/// listener bind/accept failure is the one fatal error class (spec §7).
pub async fn serve(port: u16) -> Result<(), ServerError> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(ServerError::Bind)?;
    info!("listening on 0.0.0.0:{port}");
    serve_on(listener).await
}

/// Runs the server on an already-bound listener. Split out from [`serve`] so
/// tests can bind on an ephemeral port and learn the chosen address before
/// the accept loop starts.
pub async fn serve_on(listener: TcpListener) -> Result<(), ServerError> {
    let registry = Arc::new(Mutex::new(Registry::new()));
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    tokio::spawn(dispatch::run(Arc::clone(&registry), queue_rx));

    let next_conn_id = AtomicU64::new(0);
    loop {
        let (stream, peer) = listener.accept().await.map_err(ServerError::Accept)?;
        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
        info!("accepted connection {conn_id} from {peer}");

        let registry = Arc::clone(&registry);
        let queue_tx = queue_tx.clone();
        tokio::spawn(async move {
            connection::handle_connection(stream, conn_id, registry, queue_tx).await;
        });
    }
}
