//! Error types for Job Part Plan operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for plan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, opening or mutating a plan file
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Plan file not found
    #[error("Plan file not found: {path}")]
    NotFound { path: PathBuf },

    /// The file was written with a different schema version
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: u32, found: u32 },

    /// An invariant of the plan layout does not hold
    #[error("Corrupt plan: {reason}")]
    CorruptPlan { reason: String },

    /// A status change that is not legal from the current state
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    /// An optional attribute does not fit its fixed-capacity buffer
    #[error("{field} is {len} bytes, capacity is {capacity}")]
    AttributeTooLong {
        field: &'static str,
        len: usize,
        capacity: usize,
    },

    /// A transfer cannot be represented in the plan layout
    #[error("Invalid transfer: {reason}")]
    InvalidTransfer { reason: String },

    /// Transfer index out of bounds
    #[error("Transfer index out of bounds: {index} >= {count}")]
    TransferIndexOutOfBounds { index: u32, count: u32 },

    /// Memory mapping failed
    #[error("Memory mapping failed: {0}")]
    MemoryMapFailed(String),
}

impl Error {
    /// Create a corrupt plan error
    pub fn corrupt<S: Into<String>>(reason: S) -> Self {
        Error::CorruptPlan {
            reason: reason.into(),
        }
    }

    /// Create a schema version mismatch error
    pub fn version_mismatch(expected: u32, found: u32) -> Self {
        Error::SchemaVersionMismatch { expected, found }
    }

    /// Create a not found error
    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        Error::NotFound { path: path.into() }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: &'static str, to: &'static str) -> Self {
        Error::InvalidTransition { from, to }
    }

    /// Create an attribute too long error
    pub fn attribute_too_long(field: &'static str, len: usize, capacity: usize) -> Self {
        Error::AttributeTooLong {
            field,
            len,
            capacity,
        }
    }

    /// Create an invalid transfer error
    pub fn invalid_transfer<S: Into<String>>(reason: S) -> Self {
        Error::InvalidTransfer {
            reason: reason.into(),
        }
    }

    /// Create a transfer index out of bounds error
    pub fn transfer_index_out_of_bounds(index: u32, count: u32) -> Self {
        Error::TransferIndexOutOfBounds { index, count }
    }

    /// Create a memory mapping error
    pub fn memory_map_failed<S: Into<String>>(message: S) -> Self {
        Error::MemoryMapFailed(message.into())
    }

    /// True if the file itself is unusable (as opposed to a caller mistake)
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptPlan { .. } | Error::SchemaVersionMismatch { .. }
        )
    }
}
