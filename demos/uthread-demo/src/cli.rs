use clap::{Parser, ValueEnum};

use uthread::{Policy, SchedulerConfig};

/// Run a handful of cooperative green threads and report how they were
/// dispatched.
#[derive(Parser, Debug)]
#[command(name = "uthread-demo", version, about)]
pub struct Cli {
    /// Number of worker threads (also the scheduler capacity).
    #[arg(short, long, default_value_t = 3)]
    pub threads: usize,

    /// Times each worker yields before exiting.
    #[arg(short, long, default_value_t = 2)]
    pub yields: usize,

    /// Thread selection policy.
    #[arg(long, value_enum, default_value = "round-robin")]
    pub policy: PolicyArg,

    /// Stack size per thread in bytes.
    #[arg(long, default_value_t = uthread::config::DEFAULT_STACK_SIZE)]
    pub stack_size: usize,

    /// Show scheduler debug logs.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    RoundRobin,
    LowestIndex,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::RoundRobin => Policy::RoundRobin,
            PolicyArg::LowestIndex => Policy::LowestIndex,
        }
    }
}

impl Cli {
    /// Scheduler configuration for the worker run.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .capacity(self.threads)
            .stack_size(self.stack_size)
            .policy(self.policy.into())
    }
}
