//! Error types for the collaboration server.

use thiserror::Error;

/// Errors encountered while parsing or handling a single client request.
///
/// All of these are recoverable per the wire protocol: the offending
/// connection is kept open and the dispatcher replies with a bare
/// `Invalid request` line instead of a framed response.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The field named by the static string was required but absent.
    #[error("missing field {0:?}")]
    MissingField(&'static str),
    /// The field's value could not be parsed as the expected integer type.
    #[error("field {0:?} is not a valid integer")]
    InvalidInteger(&'static str),
    /// The request named a document that does not exist in the registry.
    #[error("document {0:?} does not exist")]
    NoSuchDocument(String),
    /// The request's `type` field was neither `insertion` nor `deletion`.
    #[error("unknown change type {0:?}")]
    UnknownChangeType(String),
}

/// Fatal errors that abort the server process.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),
    /// The accept loop itself failed (as opposed to a single connection).
    #[error("accept loop failed")]
    Accept(#[source] std::io::Error),
}
