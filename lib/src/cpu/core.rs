//! Primitive CPU instructions: hlt, pause, halt loop.

/// Halt until the next interrupt.
#[inline(always)]
pub fn hlt() {
    #[cfg(target_os = "none")]
    x86_64::instructions::hlt();
    #[cfg(not(target_os = "none"))]
    ::core::hint::spin_loop();
}

/// Spin-loop hint.
#[inline(always)]
pub fn pause() {
    ::core::hint::spin_loop();
}

/// Idle wait: open the interrupt window, sleep until something fires, then
/// close it again before returning to the scheduler.
#[inline(always)]
pub fn idle_wait() {
    super::interrupts::enable_interrupts();
    hlt();
    super::interrupts::disable_interrupts();
}

/// Disable interrupts and halt forever.  Only an NMI or INIT can wake the
/// core, and the NMI path of a halted core lands right back here.
#[inline(always)]
pub fn halt_forever() -> ! {
    loop {
        super::interrupts::disable_interrupts();
        hlt();
    }
}
