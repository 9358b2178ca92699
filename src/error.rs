// src/error.rs

//! Error types for the build store
//!
//! Errors come in two tiers. Result-code errors report bad caller input
//! (unknown IDs, malformed names, precondition failures) and leave the store
//! unchanged; callers translate them into user-facing messages. Fatal errors
//! mean the store itself is broken (SQLite failure, corrupted invariant,
//! schema mismatch) and the caller should abort.

use thiserror::Error;

/// Result type for build store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Discriminant of the recoverable result-code errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    BadValue,
    AlreadyUsed,
    InvalidName,
    CantRemove,
    CantRevive,
    OutOfRange,
    LoopDetected,
    NotADirectory,
    BadPath,
    OnlyOneAllowed,
    InvalidOp,
}

/// Errors that can occur while querying or mutating the build store
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown ID or name
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-domain value
    #[error("bad value: {0}")]
    BadValue(String),

    /// Name collision
    #[error("already used: {0}")]
    AlreadyUsed(String),

    /// Name fails the naming grammar
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Entity still has dependents
    #[error("cannot remove: {0}")]
    CantRemove(String),

    /// Entity cannot be brought back from the trash
    #[error("cannot revive: {0}")]
    CantRevive(String),

    /// Hierarchy or placement constraint violated
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The change would introduce a cycle
    #[error("loop detected: {0}")]
    LoopDetected(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("bad path: {0}")]
    BadPath(String),

    /// A record already exists where only one is permitted
    #[error("only one allowed: {0}")]
    OnlyOneAllowed(String),

    /// Operation not applicable to this kind of owner
    #[error("invalid operation: {0}")]
    InvalidOp(String),

    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Stored schema version differs from the running version
    #[error("schema version mismatch: store is version {found}, expected {expected}")]
    SchemaVersion { found: i32, expected: i32 },

    /// A storage-level invariant has been violated
    #[error("store is corrupted: {0}")]
    Corrupt(String),

    /// Hard capacity limit reached
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl Error {
    /// The result code for recoverable errors, `None` for fatal ones
    pub fn code(&self) -> Option<ErrorCode> {
        let code = match self {
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::BadValue(_) => ErrorCode::BadValue,
            Error::AlreadyUsed(_) => ErrorCode::AlreadyUsed,
            Error::InvalidName(_) => ErrorCode::InvalidName,
            Error::CantRemove(_) => ErrorCode::CantRemove,
            Error::CantRevive(_) => ErrorCode::CantRevive,
            Error::OutOfRange(_) => ErrorCode::OutOfRange,
            Error::LoopDetected(_) => ErrorCode::LoopDetected,
            Error::NotADirectory(_) => ErrorCode::NotADirectory,
            Error::BadPath(_) => ErrorCode::BadPath,
            Error::OnlyOneAllowed(_) => ErrorCode::OnlyOneAllowed,
            Error::InvalidOp(_) => ErrorCode::InvalidOp,
            Error::Database(_)
            | Error::Io(_)
            | Error::Config(_)
            | Error::SchemaVersion { .. }
            | Error::Corrupt(_)
            | Error::LimitExceeded(_) => return None,
        };
        Some(code)
    }

    /// Whether this error signals a broken store rather than bad input
    pub fn is_fatal(&self) -> bool {
        self.code().is_none()
    }
}
