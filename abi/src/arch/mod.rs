//! Architecture-specific definitions.

pub mod x86_64;

pub use x86_64::*;

/// Base vector for hardware IRQs (IRQ0 maps to this vector).
pub use x86_64::idt::IRQ_BASE_VECTOR;

/// Syscall interrupt vector.
pub use x86_64::idt::SYSCALL_VECTOR;
