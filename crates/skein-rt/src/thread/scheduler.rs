use super::table::ThreadTable;
use super::RUNTIME;
use crate::context::ExecutionContext;
use crate::sync::critical::CriticalSection;
use crate::thread::tcb::ThreadState;
use crate::types::ThreadId;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub trait Scheduler: Sync {
    /// Select the thread to run after `current`. `current` itself is a valid
    /// answer when it is the only runnable thread; `None` means no slot is
    /// runnable at all.
    fn pick_next(&self, table: &ThreadTable, current: ThreadId) -> Option<ThreadId>;
}

/// Strict round-robin by increasing slot index, wrapping.
pub struct RoundRobinScheduler;

impl Scheduler for RoundRobinScheduler {
    fn pick_next(&self, table: &ThreadTable, current: ThreadId) -> Option<ThreadId> {
        let capacity = table.capacity();
        (1..=capacity)
            .map(|offset| ThreadId::from_index((current.index() + offset) % capacity))
            .find(|&id| table.state(id).is_runnable())
    }
}

/// Reentrancy guard: set for the whole scan-and-switch sequence.
static SCHEDULER_LOCK: AtomicBool = AtomicBool::new(false);
static SWITCHES: AtomicU64 = AtomicU64::new(0);

pub(crate) fn is_locked() -> bool {
    SCHEDULER_LOCK.load(Ordering::Acquire)
}

pub(crate) fn switches() -> u64 {
    SWITCHES.load(Ordering::Relaxed)
}

pub(crate) fn reset_stats() {
    SWITCHES.store(0, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Another thread ran; the caller has since been resumed.
    Switched,
    /// The caller is the only runnable thread and keeps running.
    Stayed,
    /// No slot is runnable, the caller included.
    Idle,
}

/// One scheduling decision. Runs from the timer handler and from every
/// voluntary suspension point; must never log or allocate.
pub(crate) fn tick(_section: &CriticalSection) -> Tick {
    SCHEDULER_LOCK.store(true, Ordering::Release);

    let (from, to) = {
        let mut rt = RUNTIME.lock();
        let prev = rt.current;
        if rt.table.state(prev) == ThreadState::Free {
            crate::fatal("current thread occupies a free slot");
        }

        let next = match rt.scheduler.pick_next(&rt.table, prev) {
            Some(next) if next != prev => next,
            other => {
                SCHEDULER_LOCK.store(false, Ordering::Release);
                return if other.is_some() {
                    Tick::Stayed
                } else {
                    Tick::Idle
                };
            }
        };

        if rt.table.state(prev) == ThreadState::Running {
            rt.table.get_mut(prev).state = ThreadState::Ready;
        }
        rt.table.get_mut(next).state = ThreadState::Running;
        rt.current = next;
        rt.table.context_pair(prev, next)
    };

    SWITCHES.fetch_add(1, Ordering::Relaxed);
    SCHEDULER_LOCK.store(false, Ordering::Release);

    // The table guard is gone and interrupts are still off; nothing else
    // can touch either context until the switch completes.
    unsafe { ExecutionContext::switch(from, to) };
    Tick::Switched
}
