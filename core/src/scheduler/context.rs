//! Execution-context capabilities.
//!
//! Code that may block receives a [`TaskCx`]; interrupt handlers receive an
//! [`crate::irq::IrqCx`], which can wake queues but has no way to sleep.

use kestrel_abi::task::TaskId;
use kestrel_lib::TrapFrame;

use super::scheduler::{SchedError, Scheduler, SleepError};
use super::wait_queue::WaitQueue;

/// Entry point of a kernel worker thread.
pub type WorkerEntry = fn(&TaskCx<'_>, usize);

/// Proof that the holder runs in task context on some core.
pub struct TaskCx<'a> {
    sched: &'a Scheduler<'a>,
}

impl<'a> TaskCx<'a> {
    pub(crate) fn new(sched: &'a Scheduler<'a>) -> Self {
        Self { sched }
    }

    /// Block on `queue` until a wakeup makes this task READY and it is
    /// scheduled again.  The condition slept on must be re-checked after
    /// this returns: a wakeup that ran before the call is not remembered.
    pub fn sleep_on(&self, queue: &WaitQueue) -> Result<(), SleepError> {
        self.sched.sleep_on(queue)
    }

    /// Cooperative yield point.
    pub fn yield_or_block(&self, reschedule: bool) {
        self.sched.yield_or_block(reschedule);
    }

    pub fn wakeup_queue(&self, queue: &WaitQueue) -> usize {
        self.sched.wakeup_queue(queue)
    }

    /// Syscall entry: remember `frame` as this task's in-flight syscall.
    pub fn enter_syscall(&self, frame: &mut TrapFrame) -> Result<(), SchedError> {
        self.sched.set_syscall_frame(Some(frame as *mut TrapFrame))
    }

    pub fn exit_syscall(&self) -> Result<(), SchedError> {
        self.sched.set_syscall_frame(None)
    }

    pub fn syscall_frame(&self) -> Option<*mut TrapFrame> {
        self.sched.syscall_frame()
    }

    pub fn current(&self) -> Option<TaskId> {
        self.sched.current(self.sched.this_cpu())
    }

    pub fn scheduler(&self) -> &'a Scheduler<'a> {
        self.sched
    }
}
