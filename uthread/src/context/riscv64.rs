//! RISC-V 64 (LP64D) context switch.
//!
//! Callee-saved state: ra, sp, s0-s11 and fs0-fs11.

use core::arch::naked_asm;

/// Register block. Offsets are hard-coded in the assembly below.
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct Registers {
    /// Resume address.
    pub ra: u64, // 0
    pub sp: u64, // 8
    /// s0-s11.
    pub s: [u64; 12], // 16
    /// fs0-fs11.
    pub fs: [u64; 12], // 112
}

impl Registers {
    pub const EMPTY: Registers = Registers {
        ra: 0,
        sp: 0,
        s: [0; 12],
        fs: [0; 12],
    };

    /// Start in [`start_shim`] with s1 = entry and s2 = argument.
    pub fn synthesize(entry: usize, arg: usize, sp: usize) -> Self {
        let mut regs = Registers::EMPTY;
        regs.ra = start_shim as *const () as u64;
        regs.sp = sp as u64;
        regs.s[1] = entry as u64;
        regs.s[2] = arg as u64;
        regs
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }

    pub fn instruction_pointer(&self) -> usize {
        self.ra as usize
    }
}

#[unsafe(naked)]
unsafe extern "C" fn start_shim() -> ! {
    naked_asm!(
        "mv a0, s2",
        "li s0, 0",
        "jalr s1",
        "unimp",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn capture(_ctx: *mut Registers) {
    // a0 = ctx
    naked_asm!(
        "sd ra, 0(a0)",
        "sd sp, 8(a0)",
        "sd s0, 16(a0)",
        "sd s1, 24(a0)",
        "sd s2, 32(a0)",
        "sd s3, 40(a0)",
        "sd s4, 48(a0)",
        "sd s5, 56(a0)",
        "sd s6, 64(a0)",
        "sd s7, 72(a0)",
        "sd s8, 80(a0)",
        "sd s9, 88(a0)",
        "sd s10, 96(a0)",
        "sd s11, 104(a0)",
        "fsd fs0, 112(a0)",
        "fsd fs1, 120(a0)",
        "fsd fs2, 128(a0)",
        "fsd fs3, 136(a0)",
        "fsd fs4, 144(a0)",
        "fsd fs5, 152(a0)",
        "fsd fs6, 160(a0)",
        "fsd fs7, 168(a0)",
        "fsd fs8, 176(a0)",
        "fsd fs9, 184(a0)",
        "fsd fs10, 192(a0)",
        "fsd fs11, 200(a0)",
        "ret",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn restore(_ctx: *const Registers) -> ! {
    // a0 = ctx
    naked_asm!(
        "ld ra, 0(a0)",
        "ld sp, 8(a0)",
        "ld s0, 16(a0)",
        "ld s1, 24(a0)",
        "ld s2, 32(a0)",
        "ld s3, 40(a0)",
        "ld s4, 48(a0)",
        "ld s5, 56(a0)",
        "ld s6, 64(a0)",
        "ld s7, 72(a0)",
        "ld s8, 80(a0)",
        "ld s9, 88(a0)",
        "ld s10, 96(a0)",
        "ld s11, 104(a0)",
        "fld fs0, 112(a0)",
        "fld fs1, 120(a0)",
        "fld fs2, 128(a0)",
        "fld fs3, 136(a0)",
        "fld fs4, 144(a0)",
        "fld fs5, 152(a0)",
        "fld fs6, 160(a0)",
        "fld fs7, 168(a0)",
        "fld fs8, 176(a0)",
        "fld fs9, 184(a0)",
        "fld fs10, 192(a0)",
        "fld fs11, 200(a0)",
        "ret",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn swap(_save: *mut Registers, _next: *const Registers) {
    // a0 = save, a1 = next
    naked_asm!(
        // Save current context
        "sd ra, 0(a0)",
        "sd sp, 8(a0)",
        "sd s0, 16(a0)",
        "sd s1, 24(a0)",
        "sd s2, 32(a0)",
        "sd s3, 40(a0)",
        "sd s4, 48(a0)",
        "sd s5, 56(a0)",
        "sd s6, 64(a0)",
        "sd s7, 72(a0)",
        "sd s8, 80(a0)",
        "sd s9, 88(a0)",
        "sd s10, 96(a0)",
        "sd s11, 104(a0)",
        "fsd fs0, 112(a0)",
        "fsd fs1, 120(a0)",
        "fsd fs2, 128(a0)",
        "fsd fs3, 136(a0)",
        "fsd fs4, 144(a0)",
        "fsd fs5, 152(a0)",
        "fsd fs6, 160(a0)",
        "fsd fs7, 168(a0)",
        "fsd fs8, 176(a0)",
        "fsd fs9, 184(a0)",
        "fsd fs10, 192(a0)",
        "fsd fs11, 200(a0)",
        // Restore next context
        "ld ra, 0(a1)",
        "ld sp, 8(a1)",
        "ld s0, 16(a1)",
        "ld s1, 24(a1)",
        "ld s2, 32(a1)",
        "ld s3, 40(a1)",
        "ld s4, 48(a1)",
        "ld s5, 56(a1)",
        "ld s6, 64(a1)",
        "ld s7, 72(a1)",
        "ld s8, 80(a1)",
        "ld s9, 88(a1)",
        "ld s10, 96(a1)",
        "ld s11, 104(a1)",
        "fld fs0, 112(a1)",
        "fld fs1, 120(a1)",
        "fld fs2, 128(a1)",
        "fld fs3, 136(a1)",
        "fld fs4, 144(a1)",
        "fld fs5, 152(a1)",
        "fld fs6, 160(a1)",
        "fld fs7, 168(a1)",
        "fld fs8, 176(a1)",
        "fld fs9, 184(a1)",
        "fld fs10, 192(a1)",
        "fld fs11, 200(a1)",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn test_register_offsets_match_assembly() {
        assert_eq!(offset_of!(Registers, ra), 0);
        assert_eq!(offset_of!(Registers, sp), 8);
        assert_eq!(offset_of!(Registers, s), 16);
        assert_eq!(offset_of!(Registers, fs), 112);
        assert_eq!(size_of::<Registers>(), 208);
    }

    #[test]
    fn test_synthesize_sets_entry_registers() {
        let regs = Registers::synthesize(0x4000, 7, 0x1000);
        assert_eq!(regs.s[1], 0x4000);
        assert_eq!(regs.s[2], 7);
        assert_eq!(regs.sp, 0x1000);
        assert_eq!(regs.ra, start_shim as *const () as u64);
    }
}
