use super::tcb::{Stack, ThreadControlBlock, ThreadState};
use crate::context::ExecutionContext;
use crate::types::{ThreadId, MAX_THREADS};

/// Fixed arena of thread control blocks indexed by `ThreadId`.
pub struct ThreadTable {
    slots: [ThreadControlBlock; MAX_THREADS],
}

impl ThreadTable {
    /// A table holding only the bootstrap thread, marked `Running`.
    pub const fn new() -> Self {
        let mut slots = [ThreadControlBlock::FREE; MAX_THREADS];
        let mut i = 0;
        while i < MAX_THREADS {
            slots[i].id = ThreadId::from_index(i);
            i += 1;
        }
        slots[0].state = ThreadState::Running;
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        MAX_THREADS
    }

    pub fn get(&self, id: ThreadId) -> &ThreadControlBlock {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: ThreadId) -> &mut ThreadControlBlock {
        &mut self.slots[id.index()]
    }

    pub fn state(&self, id: ThreadId) -> ThreadState {
        self.slots[id.index()].state
    }

    /// First `Free` slot, never the bootstrap slot.
    pub fn find_free(&self) -> Option<ThreadId> {
        self.slots
            .iter()
            .skip(1)
            .find(|tcb| tcb.state == ThreadState::Free)
            .map(|tcb| tcb.id)
    }

    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|tcb| tcb.state != ThreadState::Free)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadControlBlock> {
        self.slots.iter()
    }

    /// Raw pointers to the contexts of two distinct slots, for a switch.
    ///
    /// The pointers stay valid for the life of the table; they must not be
    /// dereferenced while a reference into the table is live.
    pub fn context_pair(
        &mut self,
        from: ThreadId,
        to: ThreadId,
    ) -> (*mut ExecutionContext, *const ExecutionContext) {
        debug_assert_ne!(from, to);
        let from_ptr = &mut self.slots[from.index()].context as *mut ExecutionContext;
        let to_ptr = &self.slots[to.index()].context as *const ExecutionContext;
        (from_ptr, to_ptr)
    }

    /// Resets every slot to a fresh table, returning the stacks that were
    /// still owned by spawned threads.
    pub fn reset(&mut self) -> Vec<Stack> {
        let stacks = self
            .slots
            .iter_mut()
            .filter_map(ThreadControlBlock::reclaim)
            .collect();
        self.slots[0].state = ThreadState::Running;
        stacks
    }
}
