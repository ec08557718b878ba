use core::fmt;

/// Number of slots in the thread table, bootstrap slot included.
pub const MAX_THREADS: usize = 32;

/// Default size of a spawned thread's stack.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Entry point of a spawned thread. The returned value becomes the
/// thread's exit value.
pub type ThreadEntry = fn(usize) -> usize;

/// Thread identifier: the index of the thread's slot in the table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadId(u32);

impl ThreadId {
    /// The thread that initialised the runtime. It runs on the OS thread's
    /// own stack and its slot is never reclaimed.
    pub const BOOTSTRAP: ThreadId = ThreadId(0);

    pub fn new(slot: u32) -> Option<Self> {
        ((slot as usize) < MAX_THREADS).then_some(Self(slot))
    }

    pub(crate) const fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn val(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn is_bootstrap(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
