//! Signal-delivery ABI constants.
//!
//! Only single-handler invocation is defined: the kernel builds one frame
//! that lands in the handler and plants [`SIGNAL_RETURN_SENTINEL`] as its
//! return address.  When the handler returns, the fetch from the sentinel
//! faults and the trap path turns that fault into signal-return cleanup.

/// Maximum signal number (signals are numbered 1..=NSIG).
pub const NSIG: usize = 32;

pub const SIGHUP: u8 = 1;
pub const SIGINT: u8 = 2;
pub const SIGQUIT: u8 = 3;
pub const SIGILL: u8 = 4;
pub const SIGTRAP: u8 = 5;
pub const SIGABRT: u8 = 6;
pub const SIGKILL: u8 = 9;
pub const SIGUSR1: u8 = 10;
pub const SIGSEGV: u8 = 11;
pub const SIGUSR2: u8 = 12;
pub const SIGPIPE: u8 = 13;
pub const SIGALRM: u8 = 14;
pub const SIGTERM: u8 = 15;
pub const SIGCHLD: u8 = 17;
pub const SIGWINCH: u8 = 28;

/// Return address planted below a signal handler's frame.  Never mapped in
/// any user address space, so returning to it always traps.
pub const SIGNAL_RETURN_SENTINEL: u64 = 0x0000_0008_DEAD_BEEF;

/// Bytes skipped below the interrupted user stack pointer before the
/// handler frame (the SysV red zone).
pub const SIGNAL_RED_ZONE: u64 = 128;

/// Stack alignment required at a call site by the SysV x86_64 ABI.
pub const STACK_ALIGNMENT: u64 = 16;

#[inline]
pub const fn is_valid_signal(signum: u8) -> bool {
    signum != 0 && signum as usize <= NSIG
}
