//! Crate-wide error and result types.
//!
//! Mirrors the three error families the core distinguishes: domain errors
//! (planner/business invariants), infrastructure errors (I/O), and executor
//! errors (transactional outcomes). A single `thiserror::Error` enum carries
//! all three; callers match on variants when they need to distinguish them.

use crate::operation::OperationId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // --- Domain errors ---
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("package not found: {name}")]
    PackageNotFound { name: String },

    #[error("conflict at {path}: {kind:?}")]
    Conflict {
        path: PathBuf,
        kind: crate::planner::conflict::ConflictKind,
    },

    #[error("cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    // --- Infrastructure errors ---
    #[error("filesystem operation {op} on {path}: {source}")]
    FilesystemOperation {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    // --- Executor errors ---
    #[error("empty plan")]
    EmptyPlan,

    #[error("execution cancelled during {operation}")]
    ExecutionCancelled { operation: String },

    #[error(
        "execution failed: {} executed, {} failed, {} rolled back",
        executed.len(), failed.len(), rolled_back.len()
    )]
    ExecutionFailed {
        executed: Vec<OperationId>,
        failed: Vec<OperationId>,
        rolled_back: Vec<OperationId>,
        errors: Vec<Error>,
    },

    #[error("source not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("parent directory not found: {path}")]
    ParentNotFound { path: PathBuf },

    #[error("checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("{0}")]
    Multiple(MultipleErrors),

    // --- Miscellaneous wiring ---
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("manifest serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("ignore pattern error in {file}: {reason}")]
    InvalidIgnorePattern { file: PathBuf, reason: String },
}

/// An aggregate of errors that renders as its single element when there is
/// exactly one, per spec.md §7.
#[derive(Debug)]
pub struct MultipleErrors(pub Vec<Error>);

impl std::fmt::Display for MultipleErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} errors occurred:", errors.len())?;
                for e in errors {
                    write!(f, "\n  - {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error {
    pub fn multiple(errors: Vec<Error>) -> Error {
        Error::Multiple(MultipleErrors(errors))
    }

    pub fn fs_op(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        Error::FilesystemOperation {
            op,
            path: path.into(),
            source,
        }
    }
}
