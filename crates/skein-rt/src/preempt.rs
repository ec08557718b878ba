//! Timer-driven preemption.
//!
//! A ticker OS thread plays the periodic timer: every period it raises the
//! timer signal on the owner thread. The signal's disposition is the
//! interrupt vector; installing the hook swaps our handler in and keeps the
//! previous disposition so it can be chained to and restored verbatim.

use crate::error::ThreadError;
use crate::sync::critical::{CriticalSection, TIMER_SIGNAL};
use crate::thread::{self, scheduler};
use core::ffi::{c_int, c_void};
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use log::debug;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// Previous disposition, readable from the handler without locking.
static PREVIOUS_HANDLER: AtomicUsize = AtomicUsize::new(libc::SIG_DFL);
static PREVIOUS_FLAGS: AtomicUsize = AtomicUsize::new(0);

static TIMER_TICKS: AtomicU64 = AtomicU64::new(0);
static PREEMPTIONS: AtomicU64 = AtomicU64::new(0);

/// Ticks serviced on the owner thread.
pub(crate) fn timer_ticks() -> u64 {
    TIMER_TICKS.load(Ordering::Relaxed)
}

/// Ticks that found the scheduler unlocked and ran it.
pub(crate) fn preemptions() -> u64 {
    PREEMPTIONS.load(Ordering::Relaxed)
}

pub(crate) fn reset_stats() {
    TIMER_TICKS.store(0, Ordering::Relaxed);
    PREEMPTIONS.store(0, Ordering::Relaxed);
}

pub struct PreemptionHook {
    previous: libc::sigaction,
    ticker: Ticker,
}

impl PreemptionHook {
    /// Takes over the timer vector and starts raising it on `owner` (a
    /// `pthread_t`) every `interval`.
    pub fn install(interval: Duration, owner: usize) -> Result<Self, ThreadError> {
        let mut action: libc::sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = on_timer as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_RESTART;
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        let mut previous: libc::sigaction = unsafe { mem::zeroed() };
        if unsafe { libc::sigaction(TIMER_SIGNAL, &action, &mut previous) } != 0 {
            return Err(ThreadError::Init(format!(
                "cannot install timer handler: {}",
                io::Error::last_os_error()
            )));
        }
        PREVIOUS_FLAGS.store(previous.sa_flags as usize, Ordering::Release);
        PREVIOUS_HANDLER.store(previous.sa_sigaction, Ordering::Release);

        let ticker = match Ticker::start(interval, owner) {
            Ok(ticker) => ticker,
            Err(err) => {
                restore(&previous);
                return Err(ThreadError::Init(format!(
                    "cannot start timer thread: {}",
                    err
                )));
            }
        };

        debug!(
            "preemption hook installed (period {:?}, previous handler {:#x})",
            interval, previous.sa_sigaction
        );
        Ok(Self { previous, ticker })
    }

    /// Stops the timer and puts the previous disposition back.
    pub fn uninstall(self) {
        let Self { previous, ticker } = self;
        // Ticks raised while the ticker winds down stay pending.
        let _section = CriticalSection::enter();
        ticker.stop();

        // Ignoring the signal discards a tick that is still pending, which
        // the previous disposition might otherwise treat as fatal.
        let mut ignore: libc::sigaction = unsafe { mem::zeroed() };
        ignore.sa_sigaction = libc::SIG_IGN;
        unsafe { libc::sigaction(TIMER_SIGNAL, &ignore, ptr::null_mut()) };
        restore(&previous);
        debug!("preemption hook removed");
    }
}

fn restore(previous: &libc::sigaction) {
    unsafe { libc::sigaction(TIMER_SIGNAL, previous, ptr::null_mut()) };
    PREVIOUS_HANDLER.store(libc::SIG_DFL, Ordering::Release);
    PREVIOUS_FLAGS.store(0, Ordering::Release);
}

extern "C" fn on_timer(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void) {
    let errno = unsafe { *errno_location() };

    chain_previous(signal, info, ucontext);

    // Signals that land on other OS threads only feed the previous handler.
    if thread::on_owner_thread() {
        if !scheduler::is_locked() {
            PREEMPTIONS.fetch_add(1, Ordering::Relaxed);
            let section = CriticalSection::enter();
            scheduler::tick(&section);
        }
        TIMER_TICKS.fetch_add(1, Ordering::Relaxed);
    }

    unsafe { *errno_location() = errno };
}

fn chain_previous(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void) {
    let handler = PREVIOUS_HANDLER.load(Ordering::Acquire);
    if handler == libc::SIG_DFL || handler == libc::SIG_IGN || handler == on_timer as usize {
        return;
    }
    let flags = PREVIOUS_FLAGS.load(Ordering::Acquire) as c_int;
    unsafe {
        if flags & libc::SA_SIGINFO != 0 {
            let action: extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void) =
                mem::transmute(handler);
            action(signal, info, ucontext);
        } else {
            let action: extern "C" fn(c_int) = mem::transmute(handler);
            action(signal);
        }
    }
}

#[cfg(target_os = "linux")]
unsafe fn errno_location() -> *mut c_int {
    libc::__errno_location()
}

#[cfg(target_os = "macos")]
unsafe fn errno_location() -> *mut c_int {
    libc::__error()
}

/// Periodic timer source.
struct Ticker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    fn start(interval: Duration, target: usize) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("skein-timer".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                while !flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if now < deadline {
                        std::thread::park_timeout(deadline - now);
                        continue;
                    }
                    deadline += interval;
                    if deadline < now {
                        deadline = now + interval;
                    }
                    unsafe { libc::pthread_kill(target as libc::pthread_t, TIMER_SIGNAL) };
                }
            })?;

        Ok(Self { stop, handle })
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        self.handle.thread().unpark();
        if self.handle.join().is_err() {
            crate::fatal("timer thread panicked");
        }
    }
}
