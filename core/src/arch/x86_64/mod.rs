//! x86_64 privilege transitions, syscall register convention, FPU image,
//! idle wait and keyboard-controller reboot.

pub mod fpu;
pub mod reboot;
pub mod resume;
pub mod syscall;
pub mod user;

#[cfg(test)]
mod reboot_tests;
#[cfg(test)]
mod transition_tests;

pub use fpu::{restore_floating, save_floating};
pub use reboot::{RebootError, RebootServices, reboot};
pub use syscall::*;
pub use user::{
    PrivilegeTransition, build_signal_frame, build_user_entry_frame, enter_signal_handler,
    enter_user, is_signal_return,
};

/// Idle wait: enable interrupts, halt until one arrives, disable again.
#[inline]
pub fn pause() {
    kestrel_lib::cpu::idle_wait();
}
