pub mod apic;
pub mod gdt;
pub mod idt;
pub mod rflags;

pub use apic::{FATAL_HALT_IPI, IcrCommand, IcrFlags};
pub use gdt::SegmentSelector;
pub use rflags::RFlags;
