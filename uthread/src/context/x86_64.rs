//! x86_64 System V context switch.
//!
//! Callee-saved state: rbx, rbp, r12-r15, the stack pointer, the MXCSR
//! control bits and the x87 control word.

use core::arch::naked_asm;

/// Default MXCSR: all exceptions masked, round to nearest.
const MXCSR_DEFAULT: u32 = 0x1F80;

/// Default x87 control word: all exceptions masked, 64-bit precision.
const FPU_CW_DEFAULT: u16 = 0x037F;

/// Register block. Offsets are hard-coded in the assembly below.
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct Registers {
    pub r15: u64, // 0x00
    pub r14: u64, // 0x08
    pub r13: u64, // 0x10
    pub r12: u64, // 0x18
    pub rbx: u64, // 0x20
    pub rbp: u64, // 0x28
    /// Stack pointer as seen by the code being resumed.
    pub rsp: u64, // 0x30
    /// Resume address.
    pub rip: u64, // 0x38
    pub mxcsr: u32, // 0x40
    pub fpu_cw: u16, // 0x44
    _pad: u16,
}

impl Registers {
    pub const EMPTY: Registers = Registers {
        r15: 0,
        r14: 0,
        r13: 0,
        r12: 0,
        rbx: 0,
        rbp: 0,
        rsp: 0,
        rip: 0,
        mxcsr: 0,
        fpu_cw: 0,
        _pad: 0,
    };

    /// Start in [`start_shim`] with `r12` = entry and `r13` = argument.
    ///
    /// `sp` is already 16-byte aligned; the shim's `call` pushes the return
    /// slot, so `entry` observes the usual `rsp % 16 == 8` on arrival.
    pub fn synthesize(entry: usize, arg: usize, sp: usize) -> Self {
        Registers {
            r12: entry as u64,
            r13: arg as u64,
            rsp: sp as u64,
            rip: start_shim as *const () as u64,
            mxcsr: MXCSR_DEFAULT,
            fpu_cw: FPU_CW_DEFAULT,
            ..Registers::EMPTY
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.rsp as usize
    }

    pub fn instruction_pointer(&self) -> usize {
        self.rip as usize
    }
}

/// First instructions run by a synthesized context.
#[unsafe(naked)]
unsafe extern "C" fn start_shim() -> ! {
    naked_asm!(
        "mov rdi, r13",
        // Terminate the frame-pointer chain.
        "xor ebp, ebp",
        "call r12",
        "ud2",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn capture(_ctx: *mut Registers) {
    // rdi = ctx
    naked_asm!(
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], rbx",
        "mov [rdi + 0x28], rbp",
        // Resume as if this call had just returned.
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x30], rax",
        "mov rax, [rsp]",
        "mov [rdi + 0x38], rax",
        "stmxcsr dword ptr [rdi + 0x40]",
        "fnstcw word ptr [rdi + 0x44]",
        "ret",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn restore(_ctx: *const Registers) -> ! {
    // rdi = ctx
    naked_asm!(
        "mov r15, [rdi + 0x00]",
        "mov r14, [rdi + 0x08]",
        "mov r13, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov rbx, [rdi + 0x20]",
        "mov rbp, [rdi + 0x28]",
        "ldmxcsr dword ptr [rdi + 0x40]",
        "fldcw word ptr [rdi + 0x44]",
        "mov rsp, [rdi + 0x30]",
        "jmp qword ptr [rdi + 0x38]",
    );
}

#[unsafe(naked)]
pub unsafe extern "C" fn swap(_save: *mut Registers, _next: *const Registers) {
    // rdi = save, rsi = next
    naked_asm!(
        // Save current context
        "mov [rdi + 0x00], r15",
        "mov [rdi + 0x08], r14",
        "mov [rdi + 0x10], r13",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], rbx",
        "mov [rdi + 0x28], rbp",
        "lea rax, [rsp + 8]",
        "mov [rdi + 0x30], rax",
        "mov rax, [rsp]",
        "mov [rdi + 0x38], rax",
        "stmxcsr dword ptr [rdi + 0x40]",
        "fnstcw word ptr [rdi + 0x44]",
        // Restore next context
        "mov r15, [rsi + 0x00]",
        "mov r14, [rsi + 0x08]",
        "mov r13, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov rbx, [rsi + 0x20]",
        "mov rbp, [rsi + 0x28]",
        "ldmxcsr dword ptr [rsi + 0x40]",
        "fldcw word ptr [rsi + 0x44]",
        "mov rsp, [rsi + 0x30]",
        "jmp qword ptr [rsi + 0x38]",
    );
}
