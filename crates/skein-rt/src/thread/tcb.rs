use crate::context::ExecutionContext;
use crate::error::ThreadError;
use crate::types::{ThreadEntry, ThreadId};

/// Represents the current state of a thread slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Slot is unused and owns no stack.
    Free,
    /// Thread is executing; exactly one slot is in this state.
    Running,
    /// Thread is runnable and waits for its round-robin turn.
    Ready,
    /// Thread waits on a mutex or for a join target to exit.
    Blocked,
    /// Thread has exited; its value waits to be collected by `join`.
    Zombie,
}

impl ThreadState {
    pub fn is_runnable(&self) -> bool {
        matches!(self, ThreadState::Ready | ThreadState::Running)
    }
}

/// Heap-allocated stack of a spawned thread.
pub struct Stack {
    buf: Box<[u8]>,
}

impl Stack {
    pub fn new(size: usize) -> Result<Self, ThreadError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| ThreadError::StackAlloc { size })?;
        buf.resize(size, 0);
        Ok(Self {
            buf: buf.into_boxed_slice(),
        })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// One past the highest address; stacks grow down from here.
    pub fn top(&mut self) -> *mut u8 {
        self.buf.as_mut_ptr_range().end
    }
}

/// Thread Control Block (TCB)
///
/// One per table slot. The slot owns the thread's stack, so a slot that is
/// reset to `Free` releases it.
pub struct ThreadControlBlock {
    pub id: ThreadId,
    pub state: ThreadState,
    pub context: ExecutionContext,
    pub stack: Option<Stack>,
    pub entry: Option<ThreadEntry>,
    pub arg: usize,
    pub return_value: usize,
    pub join_waiter: Option<ThreadId>,
}

impl ThreadControlBlock {
    pub const FREE: Self = Self {
        id: ThreadId::BOOTSTRAP,
        state: ThreadState::Free,
        context: ExecutionContext::EMPTY,
        stack: None,
        entry: None,
        arg: 0,
        return_value: 0,
        join_waiter: None,
    };

    /// Returns the slot to `Free`, handing back the stack so the caller can
    /// decide where it is released.
    pub fn reclaim(&mut self) -> Option<Stack> {
        self.state = ThreadState::Free;
        self.context = ExecutionContext::EMPTY;
        self.entry = None;
        self.arg = 0;
        self.return_value = 0;
        self.join_waiter = None;
        self.stack.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_top_is_end_of_buffer() {
        let mut stack = Stack::new(8192).unwrap();
        assert_eq!(stack.len(), 8192);
        let top = stack.top() as usize;
        let base = stack.buf.as_ptr() as usize;
        assert_eq!(top - base, 8192);
    }

    #[test]
    fn oversized_stack_reports_allocation_failure() {
        let err = Stack::new(usize::MAX).err();
        assert_eq!(err, Some(ThreadError::StackAlloc { size: usize::MAX }));
    }

    #[test]
    fn reclaim_releases_everything() {
        let mut tcb = ThreadControlBlock::FREE;
        tcb.state = ThreadState::Zombie;
        tcb.stack = Some(Stack::new(16 * 1024).unwrap());
        tcb.return_value = 42;
        tcb.join_waiter = ThreadId::new(1);

        let stack = tcb.reclaim();
        assert!(stack.is_some());
        assert_eq!(tcb.state, ThreadState::Free);
        assert!(tcb.stack.is_none());
        assert_eq!(tcb.return_value, 0);
        assert_eq!(tcb.join_waiter, None);
    }
}
