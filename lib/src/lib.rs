#![cfg_attr(not(test), no_std)]
#![allow(unsafe_op_in_unsafe_fn)]

// Host builds simulate per-core registers with thread-locals.
#[cfg(all(not(test), not(target_os = "none")))]
extern crate std;

pub mod cpu;
pub mod kdiag;
pub mod klog;
pub mod pcr;
pub mod ports;
pub mod spinlock;
pub mod state_flag;

pub use kdiag::{TrapFrame, kdiag_dump_trap_frame};
pub use klog::{KlogLevel, klog_get_level, klog_init, klog_register_backend, klog_set_level};
pub use pcr::{CORES, CoreTable, MAX_CPUS, PerCoreState, current_cpu, register_cpu_index_fn};
pub use ports::PortIo;
pub use spinlock::{IrqMutex, IrqMutexGuard};
pub use state_flag::InitFlag;
