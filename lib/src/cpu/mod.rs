//! CPU primitives used by the core: interrupt flag, halt, FPU image.
//!
//! On bare metal (`target_os = "none"`) these are the real instructions.
//! Hosted builds (unit tests, tooling) get a software model of the same
//! state so that locking and FPU save/restore can be exercised off-target.

pub mod core;
pub mod fpu;
pub mod interrupts;

pub use self::core::*;
pub use fpu::{FX_SAVE_AREA_SIZE, FxSaveArea, fxrstor, fxsave};
pub use interrupts::*;
