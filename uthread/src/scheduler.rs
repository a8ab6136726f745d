//! Cooperative scheduler and dispatch loop.
//!
//! A [`Scheduler`] owns a fixed table of thread slots, the saved context
//! of its dispatcher and the index of the thread currently running.
//! [`Scheduler::run`] is the dispatcher: it switches into one runnable
//! thread at a time and regains control only when that thread calls
//! [`Scheduler::yield_now`] or [`Scheduler::exit`].
//!
//! Exactly one of {dispatcher, thread 0 .. thread N-1} executes at any
//! instant, so scheduler state lives in `Cell`s behind a shared reference
//! and is never locked. The scheduler is neither `Send` nor `Sync`.
//!
//! # Example
//!
//! ```rust,no_run
//! use core::cell::Cell;
//! use uthread::{Scheduler, SchedulerConfig};
//!
//! let turns = Cell::new(0);
//! let sched = Scheduler::new(SchedulerConfig::default()).unwrap();
//! for _ in 0..3 {
//!     let turns = &turns;
//!     sched
//!         .create(move |s| {
//!             turns.set(turns.get() + 1);
//!             s.yield_now();
//!             turns.set(turns.get() + 1);
//!         })
//!         .unwrap();
//! }
//! sched.run();
//! assert_eq!(turns.get(), 6);
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::{Cell, UnsafeCell};
use core::fmt;

use log::{debug, error, info, trace, warn};

use crate::config::SchedulerConfig;
use crate::context::{self, Context};
use crate::error::{Result, SchedulerError};
use crate::stack::Stack;
use crate::thread::{Entry, Tcb, ThreadId, ThreadState, ThreadStats};

/// Cooperative green-thread scheduler.
///
/// `'env` bounds what thread bodies may borrow: closures handed to
/// [`create`](Scheduler::create) may capture references that outlive the
/// scheduler.
pub struct Scheduler<'env> {
    config: SchedulerConfig,
    /// Thread slots. Boxed so slot addresses stay fixed when the scheduler
    /// itself is moved.
    threads: Box<[Tcb<'env>]>,
    /// Dispatcher state, saved while a thread runs.
    context: UnsafeCell<Context>,
    /// Thread currently running.
    running: Cell<Option<ThreadId>>,
    /// Thread dispatched last.
    previous: Cell<Option<ThreadId>>,
    /// Slot of a thread that just exited. Its stack and body are freed
    /// once the dispatcher is back on its own stack.
    retired: Cell<Option<ThreadId>>,
    /// Set while `run` is active.
    dispatching: Cell<bool>,
    /// Total dispatcher -> thread transfers.
    dispatches: Cell<u64>,
}

impl<'env> Scheduler<'env> {
    /// Create a scheduler with every slot `Free`.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let threads: Vec<Tcb<'env>> = (0..config.capacity)
            .map(|slot| Tcb::new(ThreadId(slot)))
            .collect();

        debug!(
            "[SCHED] Scheduler initialized: {} slots, {} byte stacks, {:?}",
            config.capacity, config.stack_size, config.policy
        );

        Ok(Scheduler {
            config,
            threads: threads.into_boxed_slice(),
            context: UnsafeCell::new(Context::empty()),
            running: Cell::new(None),
            previous: Cell::new(None),
            retired: Cell::new(None),
            dispatching: Cell::new(false),
            dispatches: Cell::new(0),
        })
    }

    /// Return every slot to `Free`, dropping pending thread bodies and
    /// their stacks, and clear all counters.
    pub fn init(&mut self) {
        for tcb in self.threads.iter() {
            tcb.reset();
        }
        *self.context.get_mut() = Context::empty();
        self.running.set(None);
        self.previous.set(None);
        self.retired.set(None);
        self.dispatching.set(false);
        self.dispatches.set(0);

        debug!("[SCHED] Scheduler reset ({} slots)", self.threads.len());
    }

    /// Create a thread that will run `entry` on its own stack.
    ///
    /// Takes the lowest free slot. The body receives this scheduler so it
    /// can yield or exit; returning from the body is the same as calling
    /// [`exit`](Scheduler::exit). May be called from inside a running
    /// thread.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::ResourceExhausted`] if every slot is in use.
    /// - [`SchedulerError::AllocationFailure`] if the stack cannot be
    ///   allocated.
    ///
    /// On error the scheduler is left untouched.
    pub fn create<F>(&self, entry: F) -> Result<ThreadId>
    where
        F: FnOnce(&Scheduler<'env>) + 'env,
    {
        let Some(tcb) = self.threads.iter().find(|t| t.state() == ThreadState::Free) else {
            warn!(
                "[SCHED] Thread creation failed: all {} slots in use",
                self.threads.len()
            );
            return Err(SchedulerError::ResourceExhausted {
                capacity: self.threads.len(),
            });
        };

        let stack = Stack::new(self.config.stack_size).map_err(|e| {
            warn!("[SCHED] Thread creation failed: {}", e);
            e
        })?;

        let arg = tcb as *const Tcb<'env> as usize;
        let context = Context::synthesize(thread_main, arg, stack.top());

        debug!(
            "[SCHED] Created {} (stack {:#x}..{:#x}, sp {:#x})",
            tcb.id(),
            stack.bottom() as usize,
            stack.top() as usize,
            context.stack_pointer()
        );

        let mut entry = Some(entry);
        let body: Entry<'env> = Box::new(move |s: &Scheduler<'env>| {
            if let Some(entry) = entry.take() {
                entry(s);
            }
        });

        tcb.install(stack, context, body);
        Ok(tcb.id())
    }

    /// Dispatch threads until every slot is `Free`.
    ///
    /// Returns immediately when no thread exists. A thread that never
    /// yields or exits keeps the dispatcher from ever running again.
    ///
    /// # Panics
    ///
    /// When called from a thread of this scheduler, or when a thread
    /// overflowed its stack.
    pub fn run(&self) {
        if self.dispatching.get() {
            fatal(SchedulerError::InvalidContextUse(
                "run called from inside one of its own threads",
            ));
        }
        self.dispatching.set(true);

        info!(
            "[SCHED] Dispatch loop started with {} live threads",
            self.live_count()
        );

        loop {
            self.reclaim_retired();

            if self.is_finished() {
                break;
            }

            let Some(id) = self.next_runnable() else {
                // Every live thread is runnable while the dispatcher runs.
                warn!("[SCHED] Live threads left but none runnable");
                break;
            };

            self.dispatch(id);
        }

        self.dispatching.set(false);

        info!(
            "[SCHED] Dispatch loop finished after {} dispatches",
            self.dispatches.get()
        );
    }

    /// Switch into `id` and return once it yields or exits.
    fn dispatch(&self, id: ThreadId) {
        let tcb = &self.threads[id.index()];

        tcb.set_owner(self);
        tcb.set_state(ThreadState::Running);
        tcb.record_dispatch();
        self.running.set(Some(id));
        self.dispatches.set(self.dispatches.get() + 1);

        trace!("[SCHED] Dispatching {}", id);

        // SAFETY: the dispatcher context is ours to overwrite, and the
        // thread's context was synthesized by `create` or saved by its
        // last `yield_now`. Its stack is owned by the slot.
        unsafe { context::swap(self.context.get(), tcb.context_ptr()) };

        self.running.set(None);
        self.previous.set(Some(id));

        if !tcb.stack_intact() {
            error!("[SCHED] Stack overflow detected in {}", id);
            panic!("stack overflow in {}", id);
        }
    }

    /// Give up the CPU and let the dispatcher pick the next thread.
    ///
    /// Returns the next time this thread is dispatched.
    ///
    /// # Panics
    ///
    /// When no thread of this scheduler is running.
    pub fn yield_now(&self) {
        let id = self.running_or_fatal("yield_now called outside a running thread");
        let tcb = &self.threads[id.index()];

        tcb.set_state(ThreadState::Runnable);
        tcb.record_yield();

        trace!("[SCHED] {} yielded", id);

        // SAFETY: the dispatcher context was saved by the `swap` in
        // `dispatch` that is still waiting for us.
        unsafe { context::swap(tcb.context_ptr(), self.context.get()) };
    }

    /// Terminate the running thread and free its slot.
    ///
    /// The slot's stack and boxed body are released by the dispatcher.
    /// Frames of the calling thread are abandoned, not unwound: values
    /// they own, including what the body captured by move, are leaked
    /// unless released before this call.
    ///
    /// # Panics
    ///
    /// When no thread of this scheduler is running.
    pub fn exit(&self) -> ! {
        let id = self.running_or_fatal("exit called outside a running thread");
        let tcb = &self.threads[id.index()];

        tcb.set_state(ThreadState::Free);
        // Still executing on this stack and inside the body; the
        // dispatcher frees both.
        self.retired.set(Some(id));

        debug!("[SCHED] {} exited", id);

        // SAFETY: see `yield_now`.
        unsafe { context::restore(self.context.get()) }
    }

    /// Thread currently running, if any.
    pub fn current(&self) -> Option<ThreadId> {
        self.running.get()
    }

    /// State of slot `id`, or `None` if out of range.
    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.threads.get(id.index()).map(Tcb::state)
    }

    /// Counters of slot `id`, or `None` if out of range.
    pub fn stats(&self, id: ThreadId) -> Option<ThreadStats> {
        self.threads.get(id.index()).map(Tcb::stats)
    }

    /// Slot the configured policy would dispatch next.
    pub fn next_runnable(&self) -> Option<ThreadId> {
        let previous = self.previous.get().map(ThreadId::index);
        self.config
            .policy
            .select(self.threads.len(), previous, |slot| {
                self.threads[slot].state() == ThreadState::Runnable
            })
            .map(ThreadId)
    }

    /// Number of thread slots.
    pub fn capacity(&self) -> usize {
        self.threads.len()
    }

    /// Number of slots that are not `Free`.
    pub fn live_count(&self) -> usize {
        self.threads
            .iter()
            .filter(|t| t.state() != ThreadState::Free)
            .count()
    }

    /// Whether every slot is `Free`.
    pub fn is_finished(&self) -> bool {
        self.threads.iter().all(|t| t.state() == ThreadState::Free)
    }

    /// Total number of dispatcher -> thread transfers.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.get()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn running_or_fatal(&self, what: &'static str) -> ThreadId {
        match self.running.get() {
            Some(id) => id,
            None => fatal(SchedulerError::InvalidContextUse(what)),
        }
    }

    /// Free the stack and body of the thread that exited last.
    fn reclaim_retired(&self) {
        let Some(id) = self.retired.take() else {
            return;
        };
        let tcb = &self.threads[id.index()];

        // SAFETY: the thread has exited and never runs again, so nothing
        // executes inside its body or on its stack.
        drop(unsafe { tcb.take_entry() });
        if let Some(stack) = tcb.take_stack() {
            trace!("[SCHED] Released {} byte stack of {}", stack.size(), id);
        }
    }
}

impl fmt::Debug for Scheduler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("running", &self.running.get())
            .field("live", &self.live_count())
            .field("dispatches", &self.dispatches.get())
            .finish()
    }
}

/// First Rust frame of every green thread.
///
/// `arg` is the address of the thread's slot.
extern "C" fn thread_main(arg: usize) -> ! {
    // SAFETY: `arg` was taken from the boxed slot table of the scheduler
    // that dispatched this thread, which `run` keeps borrowed while any
    // thread executes. The `'static` is a stand-in for that borrow.
    let tcb = unsafe { &*(arg as *const Tcb<'static>) };
    let scheduler = unsafe { &*tcb.owner() };

    // SAFETY: only this thread touches its body while it runs; the
    // dispatcher drops the body after the thread has exited.
    if let Some(body) = unsafe { (*tcb.entry_ptr()).as_mut() } {
        body(scheduler);
    }
    scheduler.exit()
}

#[cold]
#[track_caller]
fn fatal(err: SchedulerError) -> ! {
    panic!("{}", err)
}
