//! The dispatcher: the single task that drains the shared request queue,
//! mutates the document/registry state under one lock, and broadcasts the
//! resulting response to every connected writer.

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::error::RequestError;
use crate::protocol::{self, Request, RequestKind};
use crate::registry::{LoginResult, Registry};

/// Runs until the request queue's sender side is dropped (process
/// shutdown). Every iteration dequeues one request, builds a response, and
/// broadcasts it; this is the single serialization point that makes the
/// rebase in [`crate::document::Document`] sufficient for convergence.
pub async fn run(registry: std::sync::Arc<Mutex<Registry>>, mut queue: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = queue.recv().await {
        let response = handle(&registry, &request).await;
        let registry = registry.lock().await;
        registry.broadcast(&response);
    }
    info!("dispatcher shutting down: request queue closed");
}

async fn handle(registry: &Mutex<Registry>, req: &Request) -> String {
    match req.kind {
        RequestKind::Login => handle_login(registry, req).await,
        RequestKind::NewDoc => handle_newdoc(registry, req).await,
        RequestKind::OpenDoc => handle_opendoc(registry, req).await,
        RequestKind::Change => handle_change(registry, req).await,
        RequestKind::ExitDoc => handle_exitdoc(registry, req).await,
        RequestKind::Logout => handle_logout(registry, req).await,
        RequestKind::CorrectError => handle_correct_error(registry, req).await,
        RequestKind::Chat => handle_chat(registry, req).await,
        RequestKind::Invalid => protocol::INVALID_REQUEST.to_string(),
    }
}

async fn handle_login(registry: &Mutex<Registry>, req: &Request) -> String {
    let Ok(user) = req.field("userName") else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let mut registry = registry.lock().await;
    match registry.login(user, req.conn_id) {
        LoginResult::AlreadyOnline => protocol::notloggedin_response(req.conn_id),
        LoginResult::Ok => {
            let docinfo = registry.docinfo_listing(user);
            protocol::loggedin_response(user, req.conn_id, &docinfo)
        }
    }
}

async fn handle_logout(registry: &Mutex<Registry>, req: &Request) -> String {
    let Ok(user) = req.field("userName") else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let mut registry = registry.lock().await;
    registry.logout(user, req.conn_id);
    protocol::loggedout_response(user)
}

async fn handle_newdoc(registry: &Mutex<Registry>, req: &Request) -> String {
    let (Ok(user), Ok(doc_name)) = (req.field("userName"), req.field("docName")) else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let mut registry = registry.lock().await;
    match registry.create_document(doc_name, user) {
        Ok(document) => protocol::created_response(user, doc_name, &document.date()),
        Err(()) => protocol::notcreatedduplicate_response(user),
    }
}

async fn handle_opendoc(registry: &Mutex<Registry>, req: &Request) -> String {
    let (Ok(user), Ok(doc_name)) = (req.field("userName"), req.field("docName")) else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let mut registry = registry.lock().await;
    let Some(document) = registry.find_document_mut(doc_name) else {
        warn!("{}", RequestError::NoSuchDocument(doc_name.to_string()));
        return protocol::INVALID_REQUEST.to_string();
    };
    document.add_collaborator(user);

    let collaborator_names = document.collaborators().to_vec();
    let collaborators = collaborator_names.join(",");
    let version = document.version;
    let chat = protocol::wire_text(document.chat());
    let content = protocol::wire_text(document.text());

    let colors = protocol::colors_csv(
        &collaborator_names
            .iter()
            .map(|name| registry.color_of(name))
            .collect::<Vec<_>>(),
    );

    protocol::update_opened_response(user, doc_name, &collaborators, &colors, version, &chat, &content)
}

async fn handle_exitdoc(registry: &Mutex<Registry>, req: &Request) -> String {
    let (Ok(user), Ok(doc_name)) = (req.field("userName"), req.field("docName")) else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let registry = registry.lock().await;
    // Deliberately not mutated: exitDoc keeps the user in the document's
    // collaborator list and keeps them online, per the documented source
    // behavior this spec preserves.
    if registry.find_document(doc_name).is_none() {
        warn!("{}", RequestError::NoSuchDocument(doc_name.to_string()));
        return protocol::INVALID_REQUEST.to_string();
    }
    let docinfo = registry.docinfo_listing(user);
    protocol::exiteddoc_response(user, doc_name, &docinfo)
}

async fn handle_correct_error(registry: &Mutex<Registry>, req: &Request) -> String {
    let (Ok(user), Ok(doc_name)) = (req.field("userName"), req.field("docName")) else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let registry = registry.lock().await;
    let Some(document) = registry.find_document(doc_name) else {
        warn!("{}", RequestError::NoSuchDocument(doc_name.to_string()));
        return protocol::INVALID_REQUEST.to_string();
    };
    protocol::corrected_response(user, doc_name, &protocol::wire_text(document.text()))
}

async fn handle_chat(registry: &Mutex<Registry>, req: &Request) -> String {
    let (Ok(user), Ok(doc_name), Ok(line)) = (
        req.field("userName"),
        req.field("docName"),
        req.field("chatContent"),
    ) else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let mut registry = registry.lock().await;
    let Some(document) = registry.find_document_mut(doc_name) else {
        warn!("{}", RequestError::NoSuchDocument(doc_name.to_string()));
        return protocol::INVALID_REQUEST.to_string();
    };
    document.append_chat(user, &protocol::unwire_text(line));
    protocol::chat_response(user, doc_name, line)
}

async fn handle_change(registry: &Mutex<Registry>, req: &Request) -> String {
    let (Ok(user), Ok(doc_name), Ok(kind)) = (
        req.field("userName"),
        req.field("docName"),
        req.field("type"),
    ) else {
        return protocol::INVALID_REQUEST.to_string();
    };
    let (Ok(position), Ok(version)) = (req.field_usize("position"), req.field_u64("version")) else {
        return protocol::INVALID_REQUEST.to_string();
    };

    let mut registry = registry.lock().await;
    let color = registry.color_of(user);
    let Some(document) = registry.find_document_mut(doc_name) else {
        warn!("{}", RequestError::NoSuchDocument(doc_name.to_string()));
        return protocol::INVALID_REQUEST.to_string();
    };

    match kind {
        "insertion" => {
            let change = req.field("change").unwrap_or("");
            let change = protocol::unwire_text(change);
            let (new_pos, new_version) = document.insert(position, &change, version);
            let length = change.chars().count();
            protocol::changed_insertion_response(
                user,
                doc_name,
                new_pos,
                length,
                new_version,
                &protocol::color_csv(color),
                &protocol::wire_text(&change),
            )
        }
        "deletion" => {
            let Ok(length) = req.field_usize("length") else {
                return protocol::INVALID_REQUEST.to_string();
            };
            let (new_pos, new_length, new_version) = document.delete(position, length, version);
            protocol::changed_deletion_response(user, doc_name, new_pos, new_length, new_version)
        }
        other => {
            warn!("{}", RequestError::UnknownChangeType(other.to_string()));
            protocol::INVALID_REQUEST.to_string()
        }
    }
}
