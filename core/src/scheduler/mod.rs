pub mod context;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod switch;
pub mod task;
pub mod wait_queue;


pub use context::{TaskCx, WorkerEntry};
pub use scheduler::{
    SCHED_TIME_SLICE_TICKS, SchedError, SchedStatsSnapshot, Scheduler, SleepError, SpawnError,
    init_scheduler, schedule, scheduler, spawn_worker_thread,
};
pub use switch::{ContextSwitch, SwitchRequest};
pub use task::{KernelStack, SwitchContext, Task, TaskTable};
pub use wait_queue::WaitQueue;
