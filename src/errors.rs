//! Error types for scheduler operations.
//!
//! Setup-phase errors (table and stack provisioning, thread admission) are
//! returned synchronously and must be checked before the scheduler starts.
//! Runtime errors inside the dispatch loop are logged and the loop keeps
//! going, since there is nothing above it to restart into.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Error type for every public kernel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// The thread table or the idle stack has not been supplied
    NotInitialized,
    /// A thread table is already installed
    AlreadyProvided,
    /// The operation is only valid before `start`
    AlreadyStarted,
    /// Every slot of the thread table is in use
    TableFull,
    /// Empty stack, reserved priority or out-of-range thread id
    InvalidArgument,
    /// The operation is only valid after `start`
    NotStarted,
    /// No thread is selected as current
    NoCurrentThread,
    /// Atomic sections nested past the counter's range
    Overflow,
    /// `end_atomic` without a matching `begin_atomic`
    Underflow,
    /// The port failed to swap contexts
    ContextSwitchFailure,
    /// Any other failure reported by the port
    Arch(ArchError),
}

/// Failures reported by an [`Arch`](crate::arch::Arch) implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchError {
    /// Capturing the caller's registers failed
    ContextCaptureFailed,
    /// Saving one context and resuming another failed
    ContextSwitchFailed,
    /// Preparing a fresh context on a stack failed
    ContextInitFailed,
    /// Resuming a saved context failed
    ResumeFailed,
    /// The tick timer could not be armed
    TimerUnavailable,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::NotInitialized => write!(f, "Thread table or idle stack not provided"),
            SchedError::AlreadyProvided => write!(f, "Thread table already provided"),
            SchedError::AlreadyStarted => write!(f, "Scheduler already started"),
            SchedError::TableFull => write!(f, "Thread table is full"),
            SchedError::InvalidArgument => write!(f, "Invalid argument"),
            SchedError::NotStarted => write!(f, "Scheduler not started"),
            SchedError::NoCurrentThread => write!(f, "No current thread"),
            SchedError::Overflow => write!(f, "Atomic section nesting overflow"),
            SchedError::Underflow => write!(f, "Atomic section nesting underflow"),
            SchedError::ContextSwitchFailure => write!(f, "Context switch failed"),
            SchedError::Arch(e) => write!(f, "Architecture error: {}", e),
        }
    }
}

impl fmt::Display for ArchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchError::ContextCaptureFailed => write!(f, "Failed to capture context"),
            ArchError::ContextSwitchFailed => write!(f, "Failed to swap contexts"),
            ArchError::ContextInitFailed => write!(f, "Failed to initialize context"),
            ArchError::ResumeFailed => write!(f, "Failed to resume context"),
            ArchError::TimerUnavailable => write!(f, "Tick timer unavailable"),
        }
    }
}

impl From<ArchError> for SchedError {
    fn from(error: ArchError) -> Self {
        match error {
            ArchError::ContextSwitchFailed => SchedError::ContextSwitchFailure,
            other => SchedError::Arch(other),
        }
    }
}
