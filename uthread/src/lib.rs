//! Cooperative user-level threads.
//!
//! This crate multiplexes green threads onto the calling OS thread:
//!
//! - [`context`]: capture / restore / swap / synthesize of CPU register
//!   state, implemented per architecture in naked assembly
//! - [`stack`]: owned fixed-size thread stacks
//! - [`thread`]: thread ids, states and counters
//! - [`scheduler`]: the slot table, thread creation and the dispatch loop
//! - [`policy`]: which runnable thread the dispatcher picks next
//!
//! Scheduling is purely cooperative. A thread keeps the CPU until it calls
//! [`Scheduler::yield_now`] or [`Scheduler::exit`]; there is no timer, no
//! priority and no parallelism.
//!
//! # Panics inside threads
//!
//! A thread body runs below an `extern "C"` frame. A panic that unwinds
//! out of a body therefore aborts the process.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod config;
pub mod context;
pub mod error;
pub mod policy;
pub mod scheduler;
pub mod stack;
pub mod thread;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use policy::Policy;
pub use scheduler::Scheduler;
pub use thread::{ThreadId, ThreadState, ThreadStats};
