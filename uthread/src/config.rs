//! Scheduler configuration.
//!
//! Compile-time defaults plus the runtime [`SchedulerConfig`] handed to
//! [`Scheduler::new`](crate::Scheduler::new).

use crate::error::{Result, SchedulerError};
use crate::policy::Policy;

/// Default number of thread slots.
pub const DEFAULT_CAPACITY: usize = 3;

/// Default stack size per thread (64 KB).
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a thread may be given (4 KB).
pub const MIN_STACK_SIZE: usize = 4 * 1024;

/// Stack alignment required by every supported calling convention.
pub const STACK_ALIGN: usize = 16;

/// Runtime scheduler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of live threads.
    pub capacity: usize,
    /// Bytes of stack allocated per thread. Rounded up to [`STACK_ALIGN`].
    pub stack_size: usize,
    /// Thread selection strategy of the dispatch loop.
    pub policy: Policy,
}

impl SchedulerConfig {
    /// Default configuration.
    pub const fn new() -> Self {
        SchedulerConfig {
            capacity: DEFAULT_CAPACITY,
            stack_size: DEFAULT_STACK_SIZE,
            policy: Policy::RoundRobin,
        }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Check that the configuration can be used to build a scheduler.
    ///
    /// A capacity of zero is accepted; every creation then fails with
    /// [`SchedulerError::ResourceExhausted`].
    pub fn validate(&self) -> Result<()> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SchedulerError::InvalidConfig("stack size below minimum"));
        }
        if self.stack_size > isize::MAX as usize - STACK_ALIGN {
            return Err(SchedulerError::InvalidConfig("stack size too large"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.policy, Policy::RoundRobin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = SchedulerConfig::new()
            .capacity(8)
            .stack_size(32 * 1024)
            .policy(Policy::LowestIndex);
        assert_eq!(config.capacity, 8);
        assert_eq!(config.stack_size, 32 * 1024);
        assert_eq!(config.policy, Policy::LowestIndex);
    }

    #[test]
    fn test_validate_rejects_tiny_stack() {
        let config = SchedulerConfig::new().stack_size(MIN_STACK_SIZE - 1);
        assert_eq!(
            config.validate(),
            Err(SchedulerError::InvalidConfig("stack size below minimum"))
        );
    }

    #[test]
    fn test_validate_accepts_zero_capacity() {
        assert!(SchedulerConfig::new().capacity(0).validate().is_ok());
    }
}
