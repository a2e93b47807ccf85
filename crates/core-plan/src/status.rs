//! Job and transfer status codes, and the atomic cell that stores them
//!
//! Exactly one 32-bit word per record is mutable once a plan is mapped. A
//! [`StatusCell`] is a typed view over such a word. Plain [`StatusCell::store`]
//! is last-writer-wins; [`StatusCell::transition`] is a compare-and-swap that
//! only moves along the edges of the state machine, so the first routine to
//! reach a terminal state wins and every later attempt fails cleanly.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

/// Display name used for codes outside the closed set
pub const INVALID_STATUS_NAME: &str = "InvalidStatusCode";

/// A closed set of status values stored as a `u32` word
pub trait StatusCode: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Numeric code as stored on disk
    fn code(self) -> u32;

    /// Decode a stored code, `None` if it is not part of the set
    fn from_code(code: u32) -> Option<Self>;

    /// Variant name
    fn name(self) -> &'static str;

    /// No transition leaves a terminal status
    fn is_terminal(self) -> bool;

    /// Whether `self -> next` is an edge of the state machine
    fn can_transition_to(self, next: Self) -> bool;

    /// Render any stored code, never failing on foreign values
    fn describe(code: u32) -> &'static str {
        Self::from_code(code)
            .map(Self::name)
            .unwrap_or(INVALID_STATUS_NAME)
    }
}

/// Lifecycle status of a job part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u32)]
pub enum JobStatus {
    /// Part is executing
    #[default]
    InProgress = 0,
    /// No transfer of the part is executing; can resume
    Paused = 1,
    /// Part was cancelled
    Cancelled = 2,
    /// Every transfer of the part reached a terminal status
    Completed = 3,
}

impl StatusCode for JobStatus {
    fn code(self) -> u32 {
        self as u32
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(JobStatus::InProgress),
            1 => Some(JobStatus::Paused),
            2 => Some(JobStatus::Cancelled),
            3 => Some(JobStatus::Completed),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            JobStatus::InProgress => "InProgress",
            JobStatus::Paused => "Paused",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Completed => "Completed",
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Cancelled | JobStatus::Completed)
    }

    fn can_transition_to(self, next: Self) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (InProgress, Paused)
                | (Paused, InProgress)
                | (InProgress, Cancelled)
                | (InProgress, Completed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a single transfer inside a job part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u32)]
pub enum TransferStatus {
    /// Not yet finished (or interrupted before finishing)
    #[default]
    InProgress = 0,
    /// Transfer finished successfully
    Completed = 1,
    /// Transfer gave up
    Failed = 2,
}

impl StatusCode for TransferStatus {
    fn code(self) -> u32 {
        self as u32
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(TransferStatus::InProgress),
            1 => Some(TransferStatus::Completed),
            2 => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            TransferStatus::InProgress => "InProgress",
            TransferStatus::Completed => "Completed",
            TransferStatus::Failed => "Failed",
        }
    }

    fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::InProgress)
    }

    fn can_transition_to(self, next: Self) -> bool {
        self == TransferStatus::InProgress && next.is_terminal()
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed view over one mapped status word
///
/// The word is kept little-endian so the file bytes do not depend on the host.
pub struct StatusCell<'a, S> {
    word: &'a AtomicU32,
    _status: PhantomData<S>,
}

impl<'a, S: StatusCode> StatusCell<'a, S> {
    pub(crate) fn new(word: &'a AtomicU32) -> Self {
        Self {
            word,
            _status: PhantomData,
        }
    }

    /// Raw stored code, whatever it is
    pub fn code(&self) -> u32 {
        u32::from_le(self.word.load(Ordering::Acquire))
    }

    /// Current status; unknown codes are reported as corruption
    pub fn load(&self) -> Result<S> {
        let code = self.code();
        S::from_code(code).ok_or_else(|| Error::corrupt(format!("unknown status code {}", code)))
    }

    /// Display name of the current code
    pub fn describe(&self) -> &'static str {
        S::describe(self.code())
    }

    /// Unconditional store; concurrent stores resolve last-writer-wins
    pub fn store(&self, status: S) {
        self.word.store(status.code().to_le(), Ordering::Release);
    }

    /// Move to `to` if that is a legal edge from the current status
    ///
    /// Returns the status that was replaced. On failure nothing is written.
    pub fn transition(&self, to: S) -> Result<S> {
        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let code = u32::from_le(current);
            let from = S::from_code(code)
                .ok_or_else(|| Error::corrupt(format!("unknown status code {}", code)))?;
            if !from.can_transition_to(to) {
                return Err(Error::invalid_transition(from.name(), to.name()));
            }
            match self.word.compare_exchange_weak(
                current,
                to.code().to_le(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(from),
                Err(actual) => current = actual,
            }
        }
    }

    /// Replace `from` with `to` only if `from` is still current
    pub fn compare_and_set(&self, from: S, to: S) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::invalid_transition(from.name(), to.name()));
        }
        self.word
            .compare_exchange(
                from.code().to_le(),
                to.code().to_le(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|actual| {
                Error::invalid_transition(S::describe(u32::from_le(actual)), to.name())
            })
    }
}

impl<S: StatusCode> fmt::Debug for StatusCell<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StatusCell").field(&self.describe()).finish()
    }
}
