//! Execution context primitive.
//!
//! A [`Context`] holds just enough register state to resume a suspended
//! computation: the resume address, the stack pointer and the registers the
//! platform calling convention treats as callee-saved. Caller-saved
//! registers are already spilled by the compiler around the call into
//! [`swap`], so they never need to be stored here.
//!
//! The four operations mirror the classic `getcontext` / `setcontext` /
//! `swapcontext` / `makecontext` family:
//!
//! - [`capture`] stores the caller's state and returns normally.
//! - [`restore`] loads a state and jumps there; it never returns.
//! - [`swap`] does both in one step and returns only when somebody later
//!   restores the saved state.
//! - [`Context::synthesize`] builds a state for code that has never run.
//!
//! None of these are checked. Restoring a context that was neither
//! captured nor synthesized, or one whose stack has been freed, is
//! undefined behavior.

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
use self::x86_64 as arch;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
use self::aarch64 as arch;

#[cfg(all(target_arch = "riscv64", target_feature = "d"))]
mod riscv64;
#[cfg(all(target_arch = "riscv64", target_feature = "d"))]
use self::riscv64 as arch;

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "aarch64",
    all(target_arch = "riscv64", target_feature = "d"),
)))]
compile_error!("uthread supports x86_64, aarch64 and riscv64 (with the D extension) only");

use crate::config::STACK_ALIGN;

/// Entry point of a synthesized context.
///
/// Receives the `arg` given to [`Context::synthesize`] in the first
/// argument register. There is no frame to return to.
pub type EntryFn = extern "C" fn(arg: usize) -> !;

/// Saved register state of one logical thread.
///
/// The layout is private to the target architecture. A default value is an
/// empty context that must not be restored.
#[derive(Debug, Default, Clone)]
#[repr(transparent)]
pub struct Context(arch::Registers);

impl Context {
    /// Create an empty context.
    pub const fn empty() -> Self {
        Context(arch::Registers::EMPTY)
    }

    /// Build a context that starts executing `entry(arg)` on a fresh stack.
    ///
    /// `stack_top` is the highest address of the stack region (one past the
    /// last usable byte). It is aligned down to [`STACK_ALIGN`] before use,
    /// so callers may pass an unaligned end address.
    pub fn synthesize(entry: EntryFn, arg: usize, stack_top: *mut u8) -> Self {
        let sp = align_down(stack_top as usize, STACK_ALIGN);
        Context(arch::Registers::synthesize(entry as usize, arg, sp))
    }

    /// Saved stack pointer.
    pub fn stack_pointer(&self) -> usize {
        self.0.stack_pointer()
    }

    /// Address execution continues at when this context is restored.
    pub fn instruction_pointer(&self) -> usize {
        self.0.instruction_pointer()
    }

    /// Whether this context was never captured or synthesized.
    pub fn is_empty(&self) -> bool {
        self.instruction_pointer() == 0
    }

    fn as_mut_ptr(this: *mut Context) -> *mut arch::Registers {
        this.cast()
    }

    fn as_ptr(this: *const Context) -> *const arch::Registers {
        this.cast()
    }
}

/// Store the caller's register state into `ctx`.
///
/// Returns normally. A later [`restore`] of `ctx` resumes right after this
/// call a second time, on whatever frame was live when it was captured.
///
/// # Safety
///
/// - `ctx` must be valid for writes.
/// - Resuming a captured context is only sound while the capturing frame
///   is still live, and the compiler does not know this call can return
///   twice. Prefer [`swap`], which never returns twice.
#[inline(always)]
pub unsafe fn capture(ctx: *mut Context) {
    unsafe { arch::capture(Context::as_mut_ptr(ctx)) }
}

/// Load register state from `ctx` and continue execution there.
///
/// # Safety
///
/// `ctx` must hold a state produced by [`capture`], [`swap`] or
/// [`Context::synthesize`] whose stack is still allocated, and must not
/// have been consumed by an earlier restore.
#[inline(always)]
pub unsafe fn restore(ctx: *const Context) -> ! {
    unsafe { arch::restore(Context::as_ptr(ctx)) }
}

/// Save the caller into `save` and resume `next`.
///
/// Returns when some later operation restores `save`.
///
/// # Safety
///
/// - `save` must be valid for writes and `next` valid for reads.
/// - `next` must satisfy the requirements of [`restore`].
/// - `save` and `next` may alias only if the context in `next` is the one
///   being saved, which makes the call a no-op round trip.
#[inline(always)]
pub unsafe fn swap(save: *mut Context, next: *const Context) {
    unsafe { arch::swap(Context::as_mut_ptr(save), Context::as_ptr(next)) }
}

#[inline]
const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}
