use core::arch::naked_asm;

/// Callee-saved state of a suspended thread (AAPCS64): x19-x28, the frame
/// pointer, the link register, the stack pointer and d8-d15.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    x: [u64; 10],
    fp: u64,
    lr: u64,
    sp: u64,
    d: [u64; 8],
}

impl ExecutionContext {
    pub const EMPTY: Self = Self {
        x: [0; 10],
        fp: 0,
        lr: 0,
        sp: 0,
        d: [0; 8],
    };

    /// Builds a context whose first resumption enters `start` on the stack
    /// ending at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must be the one-past-the-end pointer of a writable buffer
    /// that outlives the context.
    pub unsafe fn fabricate(stack_top: *mut u8, start: extern "C" fn() -> !) -> Self {
        Self {
            lr: start as usize as u64,
            sp: ((stack_top as usize) & !15) as u64,
            ..Self::EMPTY
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.sp as usize
    }
}

/// Saves the callee-saved registers into `from` and resumes `to`.
///
/// # Safety
/// `from` must be writable, `to` must hold a context produced by
/// `fabricate` or by an earlier switch away from a thread that is still
/// suspended, and that thread's stack must still be alive.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(
    _from: *mut ExecutionContext,
    _to: *const ExecutionContext,
) {
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
