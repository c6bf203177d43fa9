//! Keyboard-controller reset.
//!
//! A zeroed IDT goes in first so that if the pulse is ignored, the next
//! interrupt or exception triple-faults the machine instead.

use kestrel_lib::ports::{PS2_CMD_PULSE_RESET, PS2_COMMAND, PS2_STATUS, PS2_STATUS_INPUT_FULL};
use kestrel_lib::{PortIo, klog_info, klog_warn};

pub const SCRATCH_FRAME_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootError {
    /// No physical frame for the empty IDT.
    NoScratchFrame,
}

/// Platform services the reset path needs.
pub trait RebootServices: PortIo {
    /// Physical address of a free 4 KiB frame.
    fn allocate_frame(&self) -> Option<u64>;

    /// Kernel-virtual pointer to `phys`.
    fn map_from_physical(&self, phys: u64) -> *mut u8;

    /// `lidt` with the given base and limit.
    fn load_idt(&self, base: *const u8, limit: u16);
}

/// Try a keyboard-controller reset.  Returning `Ok` means the pulse was
/// sent but the machine is still running; the caller decides what next.
pub fn reboot<S: RebootServices + ?Sized>(svc: &S) -> Result<(), RebootError> {
    let Some(phys) = svc.allocate_frame() else {
        klog_warn!("reboot: no scratch frame for the empty IDT");
        return Err(RebootError::NoScratchFrame);
    };
    let idt = svc.map_from_physical(phys);
    // SAFETY: a freshly allocated, mapped frame owned by this path.
    unsafe { core::ptr::write_bytes(idt, 0, SCRATCH_FRAME_SIZE) };
    svc.load_idt(idt, 0);

    while svc.inb(PS2_STATUS) & PS2_STATUS_INPUT_FULL != 0 {
        core::hint::spin_loop();
    }
    klog_info!("reboot: pulsing reset line");
    svc.outb(PS2_COMMAND, PS2_CMD_PULSE_RESET);
    Ok(())
}

/// `lidt` helper for [`RebootServices`] implementations.
#[cfg(target_os = "none")]
pub fn load_idt_raw(base: *const u8, limit: u16) {
    use x86_64::VirtAddr;
    use x86_64::structures::DescriptorTablePointer;

    let ptr = DescriptorTablePointer {
        limit,
        base: VirtAddr::from_ptr(base),
    };
    // SAFETY: an empty table is the intent; nothing is expected to be
    // delivered through it.
    unsafe { x86_64::instructions::tables::lidt(&ptr) };
}
