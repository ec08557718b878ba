use core::arch::naked_asm;

const MXCSR_DEFAULT: u32 = 0x1F80;
const FPU_CW_DEFAULT: u16 = 0x037F;

/// Callee-saved state of a suspended thread (System V AMD64).
///
/// The resumption address is not stored here: it sits on the suspended
/// thread's stack, at `rsp`, where the `call` into `switch_context` left it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    rsp: u64,
    rbp: u64,
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    mxcsr: u32,
    fpu_cw: u16,
    _pad: u16,
}

impl ExecutionContext {
    pub const EMPTY: Self = Self {
        rsp: 0,
        rbp: 0,
        rbx: 0,
        r12: 0,
        r13: 0,
        r14: 0,
        r15: 0,
        mxcsr: MXCSR_DEFAULT,
        fpu_cw: FPU_CW_DEFAULT,
        _pad: 0,
    };

    /// Builds a context whose first resumption enters `start` on the stack
    /// ending at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must be the one-past-the-end pointer of a writable buffer
    /// of at least 32 bytes that outlives the context.
    pub unsafe fn fabricate(stack_top: *mut u8, start: extern "C" fn() -> !) -> Self {
        let top = (stack_top as usize) & !15;
        // `ret` pops the entry address; the zero above it stands in for the
        // caller's return address so `start` sees the alignment of a call.
        let frame = (top - 16) as *mut u64;
        frame.write(start as usize as u64);
        frame.add(1).write(0);

        Self {
            rsp: frame as u64,
            ..Self::EMPTY
        }
    }

    pub fn stack_pointer(&self) -> usize {
        self.rsp as usize
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
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "stmxcsr dword ptr [rdi + 0x38]",
        "fnstcw word ptr [rdi + 0x3c]",
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "ldmxcsr dword ptr [rsi + 0x38]",
        "fldcw word ptr [rsi + 0x3c]",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn never() -> ! {
        unreachable!()
    }

    #[test]
    fn fabricated_frame_mimics_a_call() {
        let mut stack = vec![0u8; 4096];
        let top = unsafe { stack.as_mut_ptr().add(stack.len() - 3) };
        let ctx = unsafe { ExecutionContext::fabricate(top, never) };

        let sp = ctx.stack_pointer();
        assert_eq!(sp % 16, 0);
        assert!(sp < top as usize);
        let words = sp as *const u64;
        unsafe {
            assert_eq!(*words, never as usize as u64);
            assert_eq!(*words.add(1), 0);
        }
        assert_eq!(ctx.mxcsr, MXCSR_DEFAULT);
        assert_eq!(ctx.fpu_cw, FPU_CW_DEFAULT);
    }
}
