/*!
 * Error types for jobplan
 */

use jobplan_core_plan::Error as PlanError;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, JobPlanError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

#[derive(Debug)]
pub enum JobPlanError {
    /// Plan file could not be opened, validated or updated
    Plan(PlanError),

    /// I/O error outside plan mapping
    Io(io::Error),

    /// Configuration error
    Config(String),

    /// Part is in a terminal status and will not run again
    NotResumable { part: String, status: &'static str },

    /// Every dispatch receiver is gone
    Dispatch(String),

    /// Bad command-line input
    InvalidArgument(String),

    /// Some parts of a batch operation failed
    Partial { failed: usize, total: usize },

    /// Generic error with message
    Other(String),
}

impl JobPlanError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            JobPlanError::Plan(err) => match err {
                PlanError::SchemaVersionMismatch { .. } | PlanError::CorruptPlan { .. } => {
                    EXIT_INTEGRITY
                }
                PlanError::InvalidTransition { .. } => EXIT_PARTIAL,
                _ => EXIT_FATAL,
            },
            JobPlanError::Config(_) | JobPlanError::InvalidArgument(_) | JobPlanError::Io(_) => {
                EXIT_FATAL
            }
            JobPlanError::NotResumable { .. }
            | JobPlanError::Dispatch(_)
            | JobPlanError::Partial { .. } => EXIT_PARTIAL,
            JobPlanError::Other(_) => EXIT_PARTIAL,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            JobPlanError::Plan(err) => match err {
                PlanError::Io(_) | PlanError::MemoryMapFailed(_) => ErrorCategory::IoError,
                PlanError::NotFound { .. } => ErrorCategory::Validation,
                PlanError::SchemaVersionMismatch { .. } | PlanError::CorruptPlan { .. } => {
                    ErrorCategory::Integrity
                }
                PlanError::InvalidTransition { .. } => ErrorCategory::State,
                PlanError::AttributeTooLong { .. }
                | PlanError::InvalidTransfer { .. }
                | PlanError::TransferIndexOutOfBounds { .. } => ErrorCategory::Validation,
            },
            JobPlanError::Io(_) => ErrorCategory::IoError,
            JobPlanError::Config(_) => ErrorCategory::Configuration,
            JobPlanError::NotResumable { .. } => ErrorCategory::State,
            JobPlanError::Dispatch(_) => ErrorCategory::Concurrency,
            JobPlanError::InvalidArgument(_) => ErrorCategory::Validation,
            JobPlanError::Partial { .. } => ErrorCategory::Concurrency,
            JobPlanError::Other(_) => ErrorCategory::Unknown,
        }
    }

    /// Plan files that must not be repaired or resumed
    pub fn is_integrity_failure(&self) -> bool {
        self.exit_code() == EXIT_INTEGRITY
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Path and input validation errors
    Validation,
    /// I/O operation errors
    IoError,
    /// Configuration errors
    Configuration,
    /// Version mismatch or corrupt plan layout
    Integrity,
    /// Illegal status transitions
    State,
    /// Dispatch and batch processing errors
    Concurrency,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Integrity => write!(f, "integrity"),
            ErrorCategory::State => write!(f, "state"),
            ErrorCategory::Concurrency => write!(f, "concurrency"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for JobPlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPlanError::Plan(err) => write!(f, "Plan error: {}", err),
            JobPlanError::Io(err) => write!(f, "I/O error: {}", err),
            JobPlanError::Config(msg) => write!(f, "Configuration error: {}", msg),
            JobPlanError::NotResumable { part, status } => {
                write!(f, "Part {} is {} and cannot be resumed", part, status)
            }
            JobPlanError::Dispatch(msg) => write!(f, "Dispatch error: {}", msg),
            JobPlanError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            JobPlanError::Partial { failed, total } => {
                write!(f, "{} of {} parts failed", failed, total)
            }
            JobPlanError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for JobPlanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobPlanError::Plan(err) => Some(err),
            JobPlanError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for JobPlanError {
    fn from(err: io::Error) -> Self {
        JobPlanError::Io(err)
    }
}

impl From<PlanError> for JobPlanError {
    fn from(err: PlanError) -> Self {
        JobPlanError::Plan(err)
    }
}

impl From<serde_json::Error> for JobPlanError {
    fn from(err: serde_json::Error) -> Self {
        JobPlanError::Other(format!("JSON encode error: {}", err))
    }
}
