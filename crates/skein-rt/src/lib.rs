//! User-level threads for a single OS thread.
//!
//! Threads are multiplexed onto the OS thread that initialises the runtime.
//! They switch at `yield_now`, at blocking `join` and `Mutex::lock` calls,
//! and, when a timer interval is configured, whenever the preemption timer
//! fires.
//!
//! ```no_run
//! let worker = skein_rt::spawn(|n| n * 2, 21).unwrap();
//! assert_eq!(skein_rt::join(worker), Ok(42));
//! skein_rt::shutdown();
//! ```
//!
//! The host allocator and stdio are not reentrant against a preempting
//! tick. Threads that allocate or print while the timer is running should
//! do so inside [`without_preemption`].

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
compile_error!("skein-rt supports Linux and macOS only");

pub mod config;
pub mod context;
pub mod error;
pub mod preempt;
pub mod sync;
pub mod thread;
pub mod types;

pub use config::{RuntimeConfig, MIN_STACK_SIZE};
pub use error::ThreadError;
pub use sync::Mutex;
pub use thread::tcb::ThreadState;
pub use thread::{current, exit, init, join, shutdown, spawn, yield_now};
pub use types::{ThreadEntry, ThreadId, DEFAULT_STACK_SIZE, MAX_THREADS};

use sync::CriticalSection;

/// Spawns a thread running `f`. Its return value is the thread's exit value.
///
/// The closure is moved to the heap with interrupts disabled and moved back
/// out the same way on the new thread; anything it captures is dropped on
/// that thread when `f` returns.
pub fn spawn_fn<F>(f: F) -> Result<ThreadId, ThreadError>
where
    F: FnOnce() -> usize + Send + 'static,
{
    let raw = without_preemption(|| Box::into_raw(Box::new(f)) as usize);
    spawn(run_boxed::<F>, raw).inspect_err(|_| {
        without_preemption(|| drop(unsafe { Box::from_raw(raw as *mut F) }));
    })
}

fn run_boxed<F: FnOnce() -> usize>(raw: usize) -> usize {
    let f = without_preemption(|| *unsafe { Box::from_raw(raw as *mut F) });
    f()
}

/// Runs `f` with the preemption timer masked.
pub fn without_preemption<R>(f: impl FnOnce() -> R) -> R {
    let _section = CriticalSection::enter();
    f()
}

/// Counters since the last `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Timer ticks serviced on the owner thread.
    pub timer_ticks: u64,
    /// Ticks that entered the scheduler.
    pub preemptions: u64,
    /// Context switches, voluntary and preemptive.
    pub switches: u64,
    /// Slots that are not `Free`, the bootstrap slot included.
    pub threads_in_use: usize,
}

pub fn stats() -> RuntimeStats {
    RuntimeStats {
        timer_ticks: preempt::timer_ticks(),
        preemptions: preempt::preemptions(),
        switches: thread::scheduler::switches(),
        threads_in_use: thread::threads_in_use(),
    }
}

/// Reports a broken runtime invariant and aborts. Safe to call from the
/// timer handler.
pub(crate) fn fatal(msg: &str) -> ! {
    const PREFIX: &[u8] = b"skein: fatal: ";
    unsafe {
        libc::write(libc::STDERR_FILENO, PREFIX.as_ptr().cast(), PREFIX.len());
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::write(libc::STDERR_FILENO, b"\n".as_ptr().cast(), 1);
    }
    std::process::abort()
}
