//! Session registry: connections, identities, colors, and the documents
//! they collaborate on. Mutated only by the dispatcher and by a reader
//! task's disconnect handler, both of which hold the single registry lock
//! described in the concurrency model.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::info;

use crate::document::Document;
use crate::protocol;

/// Fixed color palette, indexed by `(|onlineUsers| - 1) mod COLORS.len()`
/// after insertion, so the first online user gets `COLORS[0]`. Kept as a
/// named constant rather than config-file-driven, since nothing in the spec
/// calls for it to vary at runtime.
pub const COLORS: [(u8, u8, u8); 6] = [
    (255, 0, 0),     // red
    (0, 0, 255),     // blue
    (0, 128, 0),     // green
    (255, 165, 0),   // orange
    (255, 0, 255),   // magenta
    (211, 211, 211), // lightGray
];

/// One connection's outgoing sink. The writer task on the other end owns
/// the socket's write half and forwards whatever is sent here.
pub type Writer = mpsc::UnboundedSender<String>;

/// Outcome of a login attempt.
pub enum LoginResult {
    Ok,
    AlreadyOnline,
}

/// The process-wide, single-lock registry state.
#[derive(Default)]
pub struct Registry {
    online_users: HashSet<String>,
    user_color: HashMap<String, (u8, u8, u8)>,
    socket_user: HashMap<u64, String>,
    writers: HashMap<u64, Writer>,
    documents: Vec<Document>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly accepted connection's outgoing sink. Does not by
    /// itself log anyone in.
    pub fn register_writer(&mut self, conn_id: u64, writer: Writer) {
        self.writers.insert(conn_id, writer);
    }

    /// Writes `message` to every currently registered writer, in iteration
    /// order. Per the spec's convergence property, every dispatch result is
    /// broadcast to every connection, including ones addressed to a
    /// specific user; clients filter on `userName=`/`docName=` themselves.
    pub fn broadcast(&self, message: &str) {
        for writer in self.writers.values() {
            // A closed receiver just means that connection's reader/writer
            // pair has already torn down; disconnect cleanup handles it.
            let _ = writer.send(message.to_string());
        }
    }

    /// Sends `message` to exactly one connection. Used only for the initial
    /// handshake line, which the spec carves out as not broadcast.
    pub fn send_to(&self, conn_id: u64, message: &str) {
        if let Some(writer) = self.writers.get(&conn_id) {
            let _ = writer.send(message.to_string());
        }
    }

    /// `login(name, connId)`: fails if `name` is already online; otherwise
    /// assigns (or reuses) a color and binds the connection.
    pub fn login(&mut self, name: &str, conn_id: u64) -> LoginResult {
        if self.online_users.contains(name) {
            return LoginResult::AlreadyOnline;
        }
        self.online_users.insert(name.to_string());
        self.user_color.entry(name.to_string()).or_insert_with(|| {
            let index = (self.online_users.len() - 1) % COLORS.len();
            COLORS[index]
        });
        self.socket_user.insert(conn_id, name.to_string());
        LoginResult::Ok
    }

    /// `logout(name, connId)`: unbinds the user but retains their color
    /// mapping, so a later login reuses the same color.
    pub fn logout(&mut self, name: &str, conn_id: u64) {
        self.online_users.remove(name);
        self.socket_user.remove(&conn_id);
    }

    /// `on-disconnect(connId)`: same effect as logout, plus removal of the
    /// writer. Returns the user name that was bound, if any, so the caller
    /// can log it (disconnect never emits a response; the socket is gone).
    pub fn disconnect(&mut self, conn_id: u64) -> Option<String> {
        self.writers.remove(&conn_id);
        let name = self.socket_user.remove(&conn_id)?;
        self.online_users.remove(&name);
        info!("connection {conn_id} disconnected (user {name})");
        Some(name)
    }

    pub fn color_of(&self, name: &str) -> (u8, u8, u8) {
        self.user_color.get(name).copied().unwrap_or((0, 0, 0))
    }

    pub fn find_document(&self, name: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.name == name)
    }

    pub fn find_document_mut(&mut self, name: &str) -> Option<&mut Document> {
        self.documents.iter_mut().find(|d| d.name == name)
    }

    /// `newDoc(user, docName)`: fails if a document with that name already
    /// exists (document names are pairwise distinct for the server's
    /// lifetime).
    pub fn create_document(&mut self, name: &str, creator: &str) -> Result<&Document, ()> {
        if self.find_document(name).is_some() {
            return Err(());
        }
        self.documents.push(Document::new(name, creator));
        Ok(self.documents.last().expect("just pushed"))
    }

    /// The `docinfo` listing for every document on the server, one line per
    /// document, newline-joined, tagged with `for_user` so the client can
    /// filter the block to the response it belongs to.
    pub fn docinfo_listing(&self, for_user: &str) -> String {
        self.documents
            .iter()
            .map(|doc| {
                protocol::docinfo_line(&doc.name, &doc.date(), &doc.collaborators_csv(), for_user)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
