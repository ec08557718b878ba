//! Execution context save/restore.
//!
//! This is the only code in the crate that touches registers directly. A
//! context is captured and the next one resumed in a single call: `switch`
//! returns when some later switch names the saved context as its target.

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "aarch64")]
pub use aarch64::ExecutionContext;
#[cfg(target_arch = "aarch64")]
use aarch64::switch_context;
#[cfg(target_arch = "x86_64")]
pub use x86_64::ExecutionContext;
#[cfg(target_arch = "x86_64")]
use x86_64::switch_context;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("skein-rt supports x86_64 and aarch64 only");

impl ExecutionContext {
    /// Suspends the running computation into `from` and resumes `to`.
    ///
    /// # Safety
    /// See [`switch_context`]: `to` must describe a suspended or freshly
    /// fabricated thread whose stack is alive, and no reference into either
    /// context may be live across the call.
    #[inline(always)]
    pub unsafe fn switch(from: *mut ExecutionContext, to: *const ExecutionContext) {
        switch_context(from, to);
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::EMPTY
    }
}
