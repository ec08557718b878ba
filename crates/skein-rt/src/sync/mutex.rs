use super::critical::{CriticalSection, IrqLock};
use crate::error::ThreadError;
use crate::thread;
use crate::types::{ThreadId, MAX_THREADS};
use log::warn;

/// FIFO of blocked threads. A thread waits on at most one mutex at a time,
/// so the table capacity bounds the queue.
pub struct WaitQueue {
    slots: [ThreadId; MAX_THREADS],
    head: usize,
    len: usize,
}

impl WaitQueue {
    pub const fn new() -> Self {
        Self {
            slots: [ThreadId::BOOTSTRAP; MAX_THREADS],
            head: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns false if the queue is full.
    pub fn push_back(&mut self, id: ThreadId) -> bool {
        if self.len == MAX_THREADS {
            return false;
        }
        self.slots[(self.head + self.len) % MAX_THREADS] = id;
        self.len += 1;
        true
    }

    pub fn pop_front(&mut self) -> Option<ThreadId> {
        if self.len == 0 {
            return None;
        }
        let id = self.slots[self.head];
        self.head = (self.head + 1) % MAX_THREADS;
        self.len -= 1;
        Some(id)
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.iter().any(|queued| queued == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        (0..self.len).map(move |i| self.slots[(self.head + i) % MAX_THREADS])
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

struct MutexState {
    locked: bool,
    owner: Option<ThreadId>,
    waiters: WaitQueue,
    /// Runtime generation `owner` and `waiters` belong to.
    generation: u64,
}

impl MutexState {
    /// Forgets an owner and waiters left behind by a runtime that has since
    /// been shut down; their slots may now hold unrelated threads.
    fn sync_generation(&mut self) {
        let current = thread::generation();
        if self.generation != current {
            self.locked = false;
            self.owner = None;
            self.waiters = WaitQueue::new();
            self.generation = current;
        }
    }
}

/// Exclusive lock for runtime threads.
///
/// `unlock` wakes the oldest waiter without handing it ownership: the woken
/// thread competes again when it next runs, so a `try_lock` from a thread
/// that never queued can still get in first.
pub struct Mutex {
    state: IrqLock<MutexState>,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            state: IrqLock::new(MutexState {
                locked: false,
                owner: None,
                waiters: WaitQueue::new(),
                generation: 0,
            }),
        }
    }

    pub fn lock(&self) {
        thread::check_owner();
        loop {
            let section = CriticalSection::enter();
            let me = thread::current();
            {
                let mut state = self.state.lock();
                state.sync_generation();
                if !state.locked {
                    state.locked = true;
                    state.owner = Some(me);
                    return;
                }
                // A woken waiter that lost the race queues again at the back.
                if !state.waiters.contains(me) && !state.waiters.push_back(me) {
                    crate::fatal("mutex wait queue overflow");
                }
            }
            thread::park(&section);
        }
    }

    pub fn try_lock(&self) -> bool {
        thread::check_owner();
        let _section = CriticalSection::enter();
        let me = thread::current();
        let mut state = self.state.lock();
        state.sync_generation();
        if state.locked {
            return false;
        }
        state.locked = true;
        state.owner = Some(me);
        true
    }

    pub fn unlock(&self) -> Result<(), ThreadError> {
        thread::check_owner();
        let _section = CriticalSection::enter();
        let me = thread::current();
        let next = {
            let mut state = self.state.lock();
            state.sync_generation();
            if !state.locked || state.owner != Some(me) {
                return Err(ThreadError::NotOwner);
            }
            state.locked = false;
            state.owner = None;
            state.waiters.pop_front()
        };
        if let Some(next) = next {
            thread::wake(next);
        }
        Ok(())
    }

    /// Destroying a mutex that is still locked is a precondition violation;
    /// it is reported, not repaired.
    pub fn destroy(self) {
        let mut state = self.state.lock();
        state.sync_generation();
        if state.locked {
            warn!(
                "destroying a mutex still held by {:?} with {} waiters",
                state.owner,
                state.waiters.len()
            );
            debug_assert!(!state.locked, "destroyed a locked mutex");
        }
    }

    pub fn is_locked(&self) -> bool {
        let mut state = self.state.lock();
        state.sync_generation();
        state.locked
    }

    pub fn owner(&self) -> Option<ThreadId> {
        let mut state = self.state.lock();
        state.sync_generation();
        state.owner
    }

    /// Number of threads queued for this mutex.
    pub fn waiters(&self) -> usize {
        let mut state = self.state.lock();
        state.sync_generation();
        state.waiters.len()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
