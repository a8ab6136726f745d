use std::process::ExitCode;

use uthread::SchedulerError;

/// Errors reported by the demo.
#[derive(thiserror::Error, Debug)]
pub enum DemoError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("{threads} workers ran but {finished} finished")]
    Incomplete { threads: usize, finished: usize },

    #[error("scenario took {actual} dispatches, expected {expected}")]
    DispatchMismatch { expected: u64, actual: u64 },
}

impl DemoError {
    /// Configuration problems exit with 2, runtime failures with 1.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            DemoError::Scheduler(SchedulerError::InvalidConfig(_)) => ExitCode::from(2),
            _ => ExitCode::from(1),
        }
    }
}
