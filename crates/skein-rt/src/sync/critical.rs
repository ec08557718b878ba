//! Interrupt masking.
//!
//! The preemption timer is delivered as a signal, so "interrupts disabled"
//! means the timer signal is blocked in the calling OS thread's mask.
//! Sections nest: each one restores exactly the mask it found.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

/// Signal standing in for the timer interrupt line.
pub(crate) const TIMER_SIGNAL: libc::c_int = libc::SIGALRM;

fn timer_set() -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), TIMER_SIGNAL);
        set.assume_init()
    }
}

/// Interrupts stay disabled for as long as this value lives.
pub struct CriticalSection {
    saved: libc::sigset_t,
    // The saved mask belongs to the OS thread that created the section.
    _not_send: PhantomData<*const ()>,
}

impl CriticalSection {
    pub fn enter() -> Self {
        let block = timer_set();
        let mut saved = MaybeUninit::<libc::sigset_t>::uninit();
        unsafe {
            libc::pthread_sigmask(libc::SIG_BLOCK, &block, saved.as_mut_ptr());
            Self {
                saved: saved.assume_init(),
                _not_send: PhantomData,
            }
        }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.saved, ptr::null_mut());
        }
    }
}

/// Unblocks the timer signal regardless of any enclosing section.
///
/// Only for code that starts on a fresh stack and therefore never returns
/// into the section that switched to it.
pub(crate) fn enable_interrupts() {
    let unblock = timer_set();
    unsafe {
        libc::pthread_sigmask(libc::SIG_UNBLOCK, &unblock, ptr::null_mut());
    }
}

pub fn interrupts_enabled() -> bool {
    let mut current = MaybeUninit::<libc::sigset_t>::uninit();
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), current.as_mut_ptr());
        libc::sigismember(current.as_ptr(), TIMER_SIGNAL) == 0
    }
}

/// Shared state that may only be touched with interrupts disabled.
///
/// A guard must be dropped before the holder switches threads; a second
/// `lock` while a guard is alive is a fatal error.
pub struct IrqLock<T> {
    held: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for IrqLock<T> {}

impl<T> IrqLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        let section = CriticalSection::enter();
        if self.held.swap(true, Ordering::Acquire) {
            crate::fatal("re-entered a locked runtime structure");
        }
        IrqLockGuard {
            lock: self,
            _section: section,
        }
    }
}

pub struct IrqLockGuard<'a, T> {
    lock: &'a IrqLock<T>,
    _section: CriticalSection,
}

impl<'a, T> Deref for IrqLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for IrqLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for IrqLockGuard<'a, T> {
    fn drop(&mut self) {
        // Runs before `_section` restores the mask.
        self.lock.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_nest_and_restore() {
        assert!(interrupts_enabled());
        {
            let _outer = CriticalSection::enter();
            assert!(!interrupts_enabled());
            {
                let _inner = CriticalSection::enter();
                assert!(!interrupts_enabled());
            }
            assert!(!interrupts_enabled());
        }
        assert!(interrupts_enabled());
    }

    #[test]
    fn lock_guard_masks_while_held() {
        let lock = IrqLock::new(5u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
            assert!(!interrupts_enabled());
        }
        assert!(interrupts_enabled());
        assert_eq!(*lock.lock(), 6);
    }
}
