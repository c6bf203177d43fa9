//! Wait queues: the blocking primitive behind every driver.
//!
//! A queue is only a list of parked task ids.  Task state and the
//! task-side membership record are owned by the scheduler, which takes its
//! own lock before this one when parking or waking.

use kestrel_abi::task::{MAX_TASKS, TaskId};
use kestrel_lib::IrqMutex;

/// Parked task ids in arrival order.
pub(crate) struct WaitList {
    ids: [TaskId; MAX_TASKS],
    len: usize,
}

impl WaitList {
    const fn new() -> Self {
        Self {
            ids: [TaskId::INVALID; MAX_TASKS],
            len: 0,
        }
    }

    pub(crate) fn as_slice(&self) -> &[TaskId] {
        &self.ids[..self.len]
    }
}

pub struct WaitQueue {
    name: &'static str,
    waiters: IrqMutex<WaitList>,
}

impl WaitQueue {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            waiters: IrqMutex::new(WaitList::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Identity recorded in a parked task.  Queues must not move while
    /// tasks are parked on them.
    #[inline]
    pub fn key(&self) -> usize {
        self as *const Self as usize
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.waiters.lock().as_slice().contains(&id)
    }

    /// Append `id`; false if already present.  Capacity equals the task
    /// table, so exclusive membership means the list cannot overflow.
    pub(crate) fn enqueue(&self, id: TaskId) -> bool {
        let mut list = self.waiters.lock();
        if list.as_slice().contains(&id) || list.len == MAX_TASKS {
            return false;
        }
        let len = list.len;
        list.ids[len] = id;
        list.len += 1;
        true
    }

    /// Take every waiter, leaving the queue empty.
    pub(crate) fn drain(&self) -> WaitList {
        let mut list = self.waiters.lock();
        core::mem::replace(&mut *list, WaitList::new())
    }
}

impl core::fmt::Debug for WaitQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
