//! Thread stacks.
//!
//! Each thread owns one fixed-size stack taken from the global allocator.
//! Stacks grow downward: the initial stack pointer is [`Stack::top`] and
//! the lowest word holds a canary that an overflow would clobber first.

use alloc::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

use crate::config::{MIN_STACK_SIZE, STACK_ALIGN};
use crate::error::{Result, SchedulerError};

/// Value stored in the lowest word of every stack.
const CANARY: u64 = 0xDEAD_57AC_C0DE_CAFE;

/// An owned, fixed-size stack region.
#[derive(Debug)]
pub struct Stack {
    base: NonNull<u8>,
    size: usize,
}

impl Stack {
    /// Allocate a stack of at least `size` bytes.
    ///
    /// The size is rounded up to [`STACK_ALIGN`] and to at least
    /// [`MIN_STACK_SIZE`].
    pub fn new(size: usize) -> Result<Self> {
        let failure = SchedulerError::AllocationFailure { size };

        let rounded = size
            .max(MIN_STACK_SIZE)
            .checked_add(STACK_ALIGN - 1)
            .ok_or(failure)?
            & !(STACK_ALIGN - 1);
        let layout = Layout::from_size_align(rounded, STACK_ALIGN).map_err(|_| failure)?;

        // SAFETY: the layout has a non-zero size.
        let base = NonNull::new(unsafe { alloc(layout) }).ok_or(failure)?;

        // SAFETY: the region is at least MIN_STACK_SIZE bytes and its
        // base is 16-byte aligned.
        unsafe { base.as_ptr().cast::<u64>().write(CANARY) };

        Ok(Stack {
            base,
            size: rounded,
        })
    }

    /// Usable size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Lowest address of the region.
    pub fn bottom(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One past the highest address of the region; 16-byte aligned.
    pub fn top(&self) -> *mut u8 {
        // SAFETY: base + size is the end of the same allocation.
        unsafe { self.base.as_ptr().add(self.size) }
    }

    /// Whether `addr` lies inside the region.
    pub fn contains(&self, addr: usize) -> bool {
        let bottom = self.bottom() as usize;
        addr >= bottom && addr < bottom + self.size
    }

    /// Whether the canary at the bottom of the stack is untouched.
    pub fn is_intact(&self) -> bool {
        // SAFETY: written in `new`, aligned, inside the allocation.
        unsafe { self.base.as_ptr().cast::<u64>().read() == CANARY }
    }

    fn layout(&self) -> Layout {
        // SAFETY: validated when the stack was allocated.
        unsafe { Layout::from_size_align_unchecked(self.size, STACK_ALIGN) }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with the same layout.
        unsafe { dealloc(self.base.as_ptr(), self.layout()) }
    }
}
