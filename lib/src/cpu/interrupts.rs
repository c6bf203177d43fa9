//! Interrupt flag management: sti, cli, irqsave/irqrestore.

use kestrel_abi::arch::RFlags;

#[cfg(target_os = "none")]
mod imp {
    #[inline(always)]
    pub fn enable() {
        x86_64::instructions::interrupts::enable();
    }

    #[inline(always)]
    pub fn disable() {
        x86_64::instructions::interrupts::disable();
    }

    #[inline(always)]
    pub fn rflags() -> u64 {
        x86_64::registers::rflags::read_raw()
    }
}

#[cfg(not(target_os = "none"))]
mod imp {
    use core::sync::atomic::{AtomicBool, Ordering};

    use kestrel_abi::arch::RFlags;

    // Each host thread stands in for one core.
    std::thread_local! {
        static SIMULATED_IF: AtomicBool = const { AtomicBool::new(false) };
    }

    fn with_if<R>(f: impl FnOnce(&AtomicBool) -> R) -> R {
        SIMULATED_IF.with(f)
    }

    #[inline(always)]
    pub fn enable() {
        with_if(|f| f.store(true, Ordering::SeqCst));
    }

    #[inline(always)]
    pub fn disable() {
        with_if(|f| f.store(false, Ordering::SeqCst));
    }

    #[inline(always)]
    pub fn rflags() -> u64 {
        let mut flags = RFlags::RESERVED_1;
        if with_if(|f| f.load(Ordering::SeqCst)) {
            flags |= RFlags::INTERRUPT_ENABLE;
        }
        flags.bits()
    }
}

/// Enable interrupts (STI).
#[inline(always)]
pub fn enable_interrupts() {
    imp::enable();
}

/// Disable interrupts (CLI).
#[inline(always)]
pub fn disable_interrupts() {
    imp::disable();
}

#[inline(always)]
pub fn read_rflags() -> u64 {
    imp::rflags()
}

/// Save RFLAGS and disable interrupts (irqsave pattern).
#[inline(always)]
pub fn save_flags_cli() -> u64 {
    let flags = imp::rflags();
    imp::disable();
    flags
}

/// Re-enable interrupts only if they were enabled in `flags`.
#[inline(always)]
pub fn restore_flags(flags: u64) {
    if RFlags::from_bits_retain(flags).contains(RFlags::INTERRUPT_ENABLE) {
        imp::enable();
    }
}

#[inline(always)]
pub fn are_interrupts_enabled() -> bool {
    RFlags::from_bits_retain(imp::rflags()).contains(RFlags::INTERRUPT_ENABLE)
}
