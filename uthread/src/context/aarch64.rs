//! AArch64 (AAPCS64) context switch.
//!
//! Callee-saved state: x19-x28, the frame pointer x29, the link register
//! x30, sp, and the low halves d8-d15 of v8-v15.

use core::arch::naked_asm;

/// Register block. Offsets are hard-coded in the assembly below.
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct Registers {
    /// x19-x28.
    pub x: [u64; 10], // 0
    pub fp: u64,      // 80
    /// Resume address; restored into x30 and branched to.
    pub lr: u64, // 88
    pub sp: u64, // 96
    /// d8-d15.
    pub d: [u64; 8], // 104
}

impl Registers {
    pub const EMPTY: Registers = Registers {
        x: [0; 10],
        fp: 0,
        lr: 0,
        sp: 0,
        d: [0; 8],
    };

    /// Start in [`start_shim`] with x19 = entry and x20 = argument.
    pub fn synthesize(entry: usize, arg: usize, sp: usize) -> Self {
        let mut regs = Registers::EMPTY;
        regs.x[0] = entry as u64;
        regs.x[1] = arg as u64;
        regs.lr = start_shim as *const () as u64;
        regs.sp = sp as u64;
        regs
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }

    pub fn instruction_pointer(&self) -> usize {
        self.lr as usize
    }
}

#[unsafe(naked)]
unsafe extern "C" fn start_shim() -> ! {
    naked_asm!(
        "mov x0, x20",
        "mov x29, xzr",
        "blr x19",
        "brk #0x1",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn capture(_ctx: *mut Registers) {
    // x0 = ctx
    naked_asm!(
        "stp x19, x20, [x0, #0]",
        "stp x21, x22, [x0, #16]",
        "stp x23, x24, [x0, #32]",
        "stp x25, x26, [x0, #48]",
        "stp x27, x28, [x0, #64]",
        "stp x29, x30, [x0, #80]",
        "mov x9, sp",
        "str x9, [x0, #96]",
        "stp d8, d9, [x0, #104]",
        "stp d10, d11, [x0, #120]",
        "stp d12, d13, [x0, #136]",
        "stp d14, d15, [x0, #152]",
        "ret",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn restore(_ctx: *const Registers) -> ! {
    // x0 = ctx
    naked_asm!(
        "ldp x19, x20, [x0, #0]",
        "ldp x21, x22, [x0, #16]",
        "ldp x23, x24, [x0, #32]",
        "ldp x25, x26, [x0, #48]",
        "ldp x27, x28, [x0, #64]",
        "ldp x29, x30, [x0, #80]",
        "ldr x9, [x0, #96]",
        "mov sp, x9",
        "ldp d8, d9, [x0, #104]",
        "ldp d10, d11, [x0, #120]",
        "ldp d12, d13, [x0, #136]",
        "ldp d14, d15, [x0, #152]",
        "ret",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn swap(_save: *mut Registers, _next: *const Registers) {
    // x0 = save, x1 = next
    naked_asm!(
        // Save current context
        "stp x19, x20, [x0, #0]",
        "stp x21, x22, [x0, #16]",
        "stp x23, x24, [x0, #32]",
        "stp x25, x26, [x0, #48]",
        "stp x27, x28, [x0, #64]",
        "stp x29, x30, [x0, #80]",
        "mov x9, sp",
        "str x9, [x0, #96]",
        "stp d8, d9, [x0, #104]",
        "stp d10, d11, [x0, #120]",
        "stp d12, d13, [x0, #136]",
        "stp d14, d15, [x0, #152]",
        // Restore next context
        "ldp x19, x20, [x1, #0]",
        "ldp x21, x22, [x1, #16]",
        "ldp x23, x24, [x1, #32]",
        "ldp x25, x26, [x1, #48]",
        "ldp x27, x28, [x1, #64]",
        "ldp x29, x30, [x1, #80]",
        "ldr x9, [x1, #96]",
        "mov sp, x9",
        "ldp d8, d9, [x1, #104]",
        "ldp d10, d11, [x1, #120]",
        "ldp d12, d13, [x1, #136]",
        "ldp d14, d15, [x1, #152]",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn test_register_offsets_match_assembly() {
        assert_eq!(offset_of!(Registers, fp), 80);
        assert_eq!(offset_of!(Registers, lr), 88);
        assert_eq!(offset_of!(Registers, sp), 96);
        assert_eq!(offset_of!(Registers, d), 104);
        assert_eq!(size_of::<Registers>(), 168);
    }
}
