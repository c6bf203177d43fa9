//! Interrupt vector assignments.

/// First vector used for remapped legacy IRQ lines.
pub const IRQ_BASE_VECTOR: u8 = 0x20;

/// Number of legacy IRQ lines routed through the IRQ table.
pub const IRQ_LINES: usize = 16;

/// Non-maskable interrupt.
pub const NMI_VECTOR: u8 = 0x02;

pub const EXCEPTION_GENERAL_PROTECTION: u8 = 0x0D;
pub const EXCEPTION_PAGE_FAULT: u8 = 0x0E;

/// Vector field of the fatal-halt IPI.  Delivery is NMI, so receivers
/// enter through [`NMI_VECTOR`] regardless of this value.
pub const FATAL_HALT_VECTOR: u8 = 0x7D;

/// Legacy `int 0x80` syscall gate.
pub const SYSCALL_VECTOR: u8 = 0x80;

pub const LEGACY_IRQ_TIMER: u8 = 0;
pub const LEGACY_IRQ_COM2: u8 = 3;
pub const LEGACY_IRQ_COM1: u8 = 4;
