//! Kestrel kernel ABI types.
//!
//! Constants and plain data shared by the scheduler, the trap layer and the
//! drivers: segment selectors, RFLAGS bits, interrupt vectors, IPI command
//! words, task identifiers and the signal-return sentinel.  Nothing here
//! touches hardware.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod arch;
pub mod signal;
pub mod task;

pub use signal::*;
pub use task::*;
