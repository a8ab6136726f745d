//! Scheduler error types.

use core::fmt;

/// Scheduler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Every thread slot is in use.
    ResourceExhausted {
        /// Configured number of slots.
        capacity: usize,
    },
    /// A thread stack could not be allocated.
    AllocationFailure {
        /// Requested stack size in bytes.
        size: usize,
    },
    /// The configuration was rejected.
    InvalidConfig(&'static str),
    /// A scheduler or context operation was used outside its precondition.
    ///
    /// This is a programming error. It is only ever raised as a panic.
    InvalidContextUse(&'static str),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::ResourceExhausted { capacity } => {
                write!(f, "no free thread slot (capacity {})", capacity)
            }
            SchedulerError::AllocationFailure { size } => {
                write!(f, "failed to allocate a {} byte stack", size)
            }
            SchedulerError::InvalidConfig(reason) => {
                write!(f, "invalid scheduler configuration: {}", reason)
            }
            SchedulerError::InvalidContextUse(what) => {
                write!(f, "invalid context use: {}", what)
            }
        }
    }
}

impl core::error::Error for SchedulerError {}

/// Result type for scheduler operations.
pub type Result<T> = core::result::Result<T, SchedulerError>;
