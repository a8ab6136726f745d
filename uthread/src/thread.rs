//! Thread control blocks.
//!
//! This module defines the per-slot bookkeeping the scheduler keeps for
//! every green thread: its state, saved context, owned stack and the
//! closure it will run.

use alloc::boxed::Box;
use core::cell::{Cell, UnsafeCell};
use core::fmt;
use core::ptr;

use crate::context::Context;
use crate::scheduler::Scheduler;
use crate::stack::Stack;

/// Thread identifier: the index of the slot the thread occupies.
///
/// Ids are reused once a thread exits and its slot is taken again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl ThreadId {
    /// Slot index.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "uthread#{}", self.0)
    }
}

/// Thread state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadState {
    /// Slot is unused.
    #[default]
    Free,
    /// Thread is waiting to be dispatched.
    Runnable,
    /// Thread owns the CPU.
    Running,
}

/// Per-thread counters. Reset whenever a slot is reused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStats {
    /// Times the dispatcher switched into this thread.
    pub dispatches: u64,
    /// Times this thread called `yield_now`.
    pub yields: u64,
}

/// Boxed thread body.
///
/// Called in place through `&mut` so the allocation stays owned by the
/// slot even when the body never returns.
pub(crate) type Entry<'env> = Box<dyn FnMut(&Scheduler<'env>) + 'env>;

/// Thread control block.
pub(crate) struct Tcb<'env> {
    id: ThreadId,
    state: Cell<ThreadState>,
    /// Saved registers. Written by `swap`/`synthesize`, read by `swap`.
    context: UnsafeCell<Context>,
    stack: Cell<Option<Stack>>,
    /// Thread body. Borrowed by the running thread, dropped by the
    /// dispatcher once the thread has exited.
    entry: UnsafeCell<Option<Entry<'env>>>,
    /// Scheduler that last dispatched this slot.
    owner: Cell<*const Scheduler<'env>>,
    stats: Cell<ThreadStats>,
}

impl<'env> Tcb<'env> {
    pub(crate) fn new(id: ThreadId) -> Self {
        Tcb {
            id,
            state: Cell::new(ThreadState::Free),
            context: UnsafeCell::new(Context::empty()),
            stack: Cell::new(None),
            entry: UnsafeCell::new(None),
            owner: Cell::new(ptr::null()),
            stats: Cell::new(ThreadStats::default()),
        }
    }

    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    pub(crate) fn state(&self) -> ThreadState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        self.state.set(state);
    }

    pub(crate) fn stats(&self) -> ThreadStats {
        self.stats.get()
    }

    pub(crate) fn record_dispatch(&self) {
        let mut stats = self.stats.get();
        stats.dispatches += 1;
        self.stats.set(stats);
    }

    pub(crate) fn record_yield(&self) {
        let mut stats = self.stats.get();
        stats.yields += 1;
        self.stats.set(stats);
    }

    pub(crate) fn context_ptr(&self) -> *mut Context {
        self.context.get()
    }

    /// Give a free slot a fresh stack, context and body.
    ///
    /// The slot must be `Free`: nothing may be executing on its old
    /// context.
    pub(crate) fn install(&self, stack: Stack, context: Context, entry: Entry<'env>) {
        debug_assert_eq!(self.state(), ThreadState::Free);

        // SAFETY: a free slot's context is not referenced by any pending
        // swap or restore, and its body is not executing.
        unsafe {
            *self.context.get() = context;
            *self.entry.get() = Some(entry);
        }
        self.stack.set(Some(stack));
        self.stats.set(ThreadStats::default());
        self.state.set(ThreadState::Runnable);
    }

    pub(crate) fn entry_ptr(&self) -> *mut Option<Entry<'env>> {
        self.entry.get()
    }

    /// Remove the thread body.
    ///
    /// # Safety
    ///
    /// The body must not be executing: the thread was never dispatched or
    /// has exited.
    pub(crate) unsafe fn take_entry(&self) -> Option<Entry<'env>> {
        unsafe { (*self.entry.get()).take() }
    }

    pub(crate) fn take_stack(&self) -> Option<Stack> {
        self.stack.take()
    }

    #[cfg(test)]
    pub(crate) fn has_entry(&self) -> bool {
        // SAFETY: shared read; tests only call this outside `run`.
        unsafe { (*self.entry.get()).is_some() }
    }

    #[cfg(test)]
    pub(crate) fn has_stack(&self) -> bool {
        let stack = self.stack.take();
        let present = stack.is_some();
        self.stack.set(stack);
        present
    }

    /// Canary check; a slot without a stack counts as intact.
    pub(crate) fn stack_intact(&self) -> bool {
        let stack = self.stack.take();
        let intact = stack.as_ref().map_or(true, Stack::is_intact);
        self.stack.set(stack);
        intact
    }

    pub(crate) fn owner(&self) -> *const Scheduler<'env> {
        self.owner.get()
    }

    pub(crate) fn set_owner(&self, owner: &Scheduler<'env>) {
        self.owner.set(owner);
    }

    /// Return the slot to its pristine `Free` state.
    pub(crate) fn reset(&self) {
        self.state.set(ThreadState::Free);
        self.stack.set(None);
        self.owner.set(ptr::null());
        self.stats.set(ThreadStats::default());
        // SAFETY: only called with exclusive access to the scheduler.
        unsafe {
            *self.entry.get() = None;
            *self.context.get() = Context::empty();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_STACK_SIZE;
    use alloc::format;
    use alloc::rc::Rc;

    extern "C" fn never(_: usize) -> ! {
        loop {}
    }

    #[test]
    fn test_new_slot_is_free() {
        let tcb = Tcb::new(ThreadId(2));
        assert_eq!(tcb.id(), ThreadId(2));
        assert_eq!(tcb.state(), ThreadState::Free);
        assert!(!tcb.has_stack());
        assert!(tcb.stack_intact());
        assert!(tcb.owner().is_null());
    }

    #[test]
    fn test_install_and_reset() {
        let tcb = Tcb::new(ThreadId(0));
        let stack = Stack::new(MIN_STACK_SIZE).unwrap();
        let ctx = Context::synthesize(never, 0, stack.top());
        tcb.record_dispatch();
        tcb.install(stack, ctx, Box::new(|_: &Scheduler<'_>| {}));

        assert_eq!(tcb.state(), ThreadState::Runnable);
        assert_eq!(tcb.stats(), ThreadStats::default());
        assert!(tcb.has_stack());
        assert!(tcb.has_entry());
        assert!(unsafe { tcb.take_entry() }.is_some());
        assert!(unsafe { tcb.take_entry() }.is_none());

        tcb.reset();
        assert_eq!(tcb.state(), ThreadState::Free);
        assert!(!tcb.has_stack());
        assert!(!tcb.has_entry());
        assert!(unsafe { (*tcb.context_ptr()).is_empty() });
    }

    #[test]
    fn test_reset_drops_pending_body() {
        let token = Rc::new(());
        let held = Rc::clone(&token);
        let tcb = Tcb::new(ThreadId(0));
        let stack = Stack::new(MIN_STACK_SIZE).unwrap();
        let ctx = Context::synthesize(never, 0, stack.top());
        tcb.install(
            stack,
            ctx,
            Box::new(move |_: &Scheduler<'_>| {
                let _ = Rc::strong_count(&held);
            }),
        );
        assert_eq!(Rc::strong_count(&token), 2);

        tcb.reset();
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn test_stats_counters() {
        let tcb = Tcb::new(ThreadId(0));
        tcb.record_dispatch();
        tcb.record_dispatch();
        tcb.record_yield();
        assert_eq!(
            tcb.stats(),
            ThreadStats {
                dispatches: 2,
                yields: 1
            }
        );
    }

    #[test]
    fn test_thread_id_display() {
        assert_eq!(format!("{}", ThreadId(4)), "uthread#4");
        assert_eq!(ThreadId(4).index(), 4);
    }
}
