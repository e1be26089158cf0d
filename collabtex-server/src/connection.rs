//! Per-connection plumbing: the accept loop creates one reader task and one
//! writer task per connection. The reader task parses lines and feeds the
//! shared request queue; the writer task owns the socket's write half and
//! simply forwards whatever the registry broadcasts to it.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::protocol::{self, Request};
use crate::registry::Registry;

/// Handles one accepted connection end to end: registers its writer, sends
/// the handshake, reads lines until EOF/error, then cleans up.
pub async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    registry: Arc<Mutex<Registry>>,
    queue: mpsc::UnboundedSender<Request>,
) {
    let (read_half, write_half) = stream.into_split();
    let (writer_tx, writer_rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(writer_task(write_half, writer_rx));

    {
        let mut registry = registry.lock().await;
        registry.register_writer(conn_id, writer_tx.clone());
    }
    // The handshake line is addressed to this connection alone; it never
    // goes through the dispatcher's broadcast.
    let _ = writer_tx.send(protocol::id_response(conn_id));

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let request = Request::parse(conn_id, &line);
                if queue.send(request).is_err() {
                    warn!("request queue closed; dropping connection {conn_id}");
                    break;
                }
            }
            Ok(None) => {
                info!("connection {conn_id} closed (EOF)");
                break;
            }
            Err(e) => {
                warn!("read error on connection {conn_id}: {e}");
                break;
            }
        }
    }

    let mut registry = registry.lock().await;
    registry.disconnect(conn_id);
}

async fn writer_task(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(message) = rx.recv().await {
        if write_half.write_all(message.as_bytes()).await.is_err() {
            break;
        }
        if write_half.write_all(b"\n").await.is_err() {
            break;
        }
    }
}
