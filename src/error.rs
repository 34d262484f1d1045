//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `conftree` library. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers all anticipated failure modes,
//! providing clear and descriptive error messages.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the library. Each variant corresponds to a specific type of
//!   error and includes contextual information to aid in debugging.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the library to simplify function signatures and ensure type
//!   safety.
//!
//! The taxonomy separates three caller-visible classes of failure:
//!
//! - **Structural/backend errors** (`Storage`, `NoSuchParent`, `Io`, `Json`):
//!   I/O failure, malformed stored documents, missing parent paths. These
//!   propagate to the caller and are never silently swallowed, except the
//!   documented missing-document-reads-as-empty-root case in the file backend.
//! - **Concurrency conflicts** (`OptimisticLock`, `DuplicateUuid`): raised by
//!   the merge engine and the reference index. Caller-recoverable by
//!   re-reading and retrying.
//! - **Programmer errors** (`PathSyntax`, `PatternSyntax`, `Batch`): fail
//!   fast at parse or call time rather than deferring to a later operation.

use thiserror::Error;

/// Main error type for conftree operations
#[derive(Error, Debug)]
pub enum Error {
    /// A backend storage operation failed for a reason other than plain I/O,
    /// e.g. the stored document root is not an object.
    #[error("Storage operation error: {message}")]
    Storage { message: String },

    /// A path string could not be parsed.
    #[error("Path syntax error in '{path}': {message}")]
    PathSyntax { path: String, message: String },

    /// A lite-XPath search pattern could not be parsed.
    #[error("Pattern syntax error in '{pattern}': {message}")]
    PatternSyntax { pattern: String, message: String },

    /// A persist targeted a path whose parent chain does not exist.
    #[error("Cannot persist '{path}': parent node does not exist")]
    NoSuchParent { path: String },

    /// A by-uuid reference path could not be resolved to a node.
    #[error("Unresolved reference: no node with uuid '{uuid}'")]
    UnresolvedReference { uuid: String },

    /// Both writers modified the same olock-marked subtree since their shared
    /// snapshot. Carries the dotted/escaped path of the conflicting subtree;
    /// callers are expected to re-read and retry.
    #[error("Optimistic lock failure at '{path}': subtree was concurrently modified")]
    OptimisticLock { path: String },

    /// A persist would bind a uuid that is already bound elsewhere in the
    /// tree. Carries both conflicting paths.
    #[error("Duplicate uuid '{uuid}': bound at '{existing}', also introduced at '{incoming}'")]
    DuplicateUuid {
        uuid: String,
        existing: String,
        incoming: String,
    },

    /// Acquiring or releasing the pessimistic backend lock failed.
    #[error("Lock error: {message}")]
    Lock { message: String },

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// A batch was misused or could not be executed.
    #[error("Batch execution error: {message}")]
    Batch { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
