#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod halt;
pub mod irq;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use halt::{FatalHalt, HaltState, IpiSender};
pub use irq::{InterruptController, InterruptRouter, IrqCx, IrqError, IrqHandler};
pub use scheduler::context::TaskCx;
pub use scheduler::scheduler::{SchedError, Scheduler, SleepError, SpawnError};
pub use scheduler::switch::ContextSwitch;
pub use scheduler::wait_queue::WaitQueue;
