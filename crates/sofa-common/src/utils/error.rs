//! Error types for Sofa.
//!
//! Failures fall into three families:
//!
//! - [`QueryError`] - the query could not be compiled (fatal, never retried)
//! - [`SequenceError`] - a terminal operation found the wrong number of rows
//! - [`DatabaseError`] - the database or the transport reported a failure

use std::fmt;

use thiserror::Error;

/// Result type alias for Sofa operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Sofa.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Query compilation error.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Cardinality violation while finishing a query.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Error reported by the database collaborator.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// A result could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the query error kind, if this is a compilation error.
    pub fn query_kind(&self) -> Option<QueryErrorKind> {
        match self {
            Error::Query(err) => Some(err.kind),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// A query compilation error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct QueryError {
    /// What went wrong.
    pub kind: QueryErrorKind,
    /// Human-readable details.
    pub message: String,
}

impl QueryError {
    /// Creates a new query error.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// An operation kind the classification table has no entry for.
    pub fn unsupported(operation: impl fmt::Display) -> Self {
        Self::new(
            QueryErrorKind::UnsupportedOperation,
            format!("operation `{operation}` is not supported"),
        )
    }

    /// A structurally invalid query.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::InvalidQuery, message)
    }

    /// A malformed operation argument.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::InvalidArgument, message)
    }
}

/// Kinds of query compilation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// The operation cannot be executed by this client.
    UnsupportedOperation,
    /// The operation chain is not expressible as a find request.
    InvalidQuery,
    /// An operation received a malformed argument.
    InvalidArgument,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::UnsupportedOperation => write!(f, "unsupported operation"),
            QueryErrorKind::InvalidQuery => write!(f, "invalid query"),
            QueryErrorKind::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}

/// Errors raised by terminal element operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    /// `Single` saw two or more rows.
    #[error("sequence contains more than one element")]
    MoreThanOneElement,

    /// `First`, `Single`, `Last` or an aggregate saw no rows.
    #[error("sequence contains no elements")]
    NoElements,
}

/// An error reported by the database.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {reason}")]
pub struct DatabaseError {
    /// Error category.
    pub kind: DatabaseErrorKind,
    /// Reason reported by the server.
    pub reason: String,
    /// Response status code, when there was a response.
    pub status: Option<u16>,
}

impl DatabaseError {
    /// Creates a new database error.
    pub fn new(kind: DatabaseErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            status: None,
        }
    }

    /// Attaches a response status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Maps a server error envelope (`{"error": ..., "reason": ...}`) into the taxonomy.
    pub fn from_response(status: u16, error: &str, reason: &str) -> Self {
        let kind = match (status, error) {
            (409, _) => DatabaseErrorKind::Conflict,
            (404, _) => DatabaseErrorKind::NotFound,
            (400, "no_usable_index") => DatabaseErrorKind::NoUsableIndex,
            _ => DatabaseErrorKind::Generic,
        };
        let reason = if reason.is_empty() { error } else { reason };
        Self::new(kind, reason).with_status(status)
    }
}

/// Categories of database errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseErrorKind {
    /// Document update conflict.
    Conflict,
    /// Database or document not found.
    NotFound,
    /// No index can serve the requested sort.
    NoUsableIndex,
    /// Any other failure, including transport errors.
    Generic,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseErrorKind::Conflict => write!(f, "conflict"),
            DatabaseErrorKind::NotFound => write!(f, "not found"),
            DatabaseErrorKind::NoUsableIndex => write!(f, "no usable index"),
            DatabaseErrorKind::Generic => write!(f, "database error"),
        }
    }
}
