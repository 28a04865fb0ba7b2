use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a ledger client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The transaction exceeds what the transport accepts.
    #[error("payload is larger than the transport limit ({size} > {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The ledger evaluated the operation and refused it.
    #[error("{operation} rejected: {reason}")]
    Rejected { operation: String, reason: String },

    /// The operation name is not one the contract exposes.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// The client could not be established or lost its connection.
    #[error("connection failure: {0}")]
    Connection(String),
}

/// Errors surfaced by a content-addressed store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content store unreachable: {0}")]
    Unreachable(String),

    #[error("content store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("payload {name} not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },

    #[error("failed to read payload {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid size label: {0}")]
    InvalidSizeLabel(String),
}

/// Errors fatal to a whole session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not establish ledger client: {0}")]
    Connection(#[from] LedgerError),

    #[error("invalid benchmark configuration: {0}")]
    Config(String),
}

/// Per-invocation timeout, kept separate so it can be classified.
#[derive(Debug, Clone, Copy, Error)]
#[error("invocation timed out after {0:?}")]
pub struct Elapsed(pub Duration);
