//! Engineered kernel-to-user transitions.
//!
//! Each transition builds a complete [`TrapFrame`] and hands it to a
//! [`PrivilegeTransition`], which performs `swapgs; iretq`.  Frame
//! construction is plain data so it can be checked off-target.

use kestrel_abi::arch::{RFlags, SegmentSelector};
use kestrel_abi::signal::{SIGNAL_RED_ZONE, SIGNAL_RETURN_SENTINEL, STACK_ALIGNMENT};
use kestrel_lib::TrapFrame;

pub trait PrivilegeTransition: Sync {
    /// Write one word of user memory in the current address space.
    fn store_user_word(&self, addr: u64, value: u64);

    /// Load every register from `frame` and return to its privilege level.
    fn iret(&self, frame: &TrapFrame) -> !;
}

fn user_frame(rip: u64, rsp: u64) -> TrapFrame {
    TrapFrame {
        rip,
        rsp,
        cs: SegmentSelector::USER_CODE.bits() as u64,
        ss: SegmentSelector::USER_DATA.bits() as u64,
        rflags: RFlags::USER_ENTRY.bits(),
        ..TrapFrame::zeroed()
    }
}

/// Initial user frame for a new program: argc/argv/envp in rdi/rsi/rdx.
pub fn build_user_entry_frame(entry: u64, argc: u64, argv: u64, envp: u64, stack: u64) -> TrapFrame {
    TrapFrame {
        rdi: argc,
        rsi: argv,
        rdx: envp,
        ..user_frame(entry, stack)
    }
}

/// Frame for a signal handler invocation on the interrupted user stack.
///
/// Skips the 128-byte red zone below the syscall-time rsp, aligns to 16 and
/// reserves one slot for the sentinel return address, so that on entry
/// `rsp + 8` is 16-byte aligned as if the handler had been `call`ed.
pub fn build_signal_frame(syscall_frame: &TrapFrame, entry: u64, signum: u64) -> TrapFrame {
    let aligned = syscall_frame.rsp.wrapping_sub(SIGNAL_RED_ZONE) & !(STACK_ALIGNMENT - 1);
    TrapFrame {
        rdi: signum,
        ..user_frame(entry, aligned.wrapping_sub(8))
    }
}

/// True when a fault was caused by a signal handler returning into the
/// planted sentinel address.
#[inline]
pub fn is_signal_return(frame: &TrapFrame) -> bool {
    frame.rip == SIGNAL_RETURN_SENTINEL && frame.from_user_mode()
}

/// Start a user program.  Never returns.
pub fn enter_user(
    pt: &dyn PrivilegeTransition,
    entry: u64,
    argc: u64,
    argv: u64,
    envp: u64,
    stack: u64,
) -> ! {
    let frame = build_user_entry_frame(entry, argc, argv, envp, stack);
    pt.iret(&frame)
}

/// Invoke a user signal handler based on the in-flight syscall frame.
/// Never returns; the handler's `ret` faults on the sentinel.
pub fn enter_signal_handler(
    pt: &dyn PrivilegeTransition,
    syscall_frame: &TrapFrame,
    entry: u64,
    signum: u64,
) -> ! {
    let frame = build_signal_frame(syscall_frame, entry, signum);
    pt.store_user_word(frame.rsp, SIGNAL_RETURN_SENTINEL);
    pt.iret(&frame)
}

#[cfg(target_os = "none")]
pub use hw::{HardwareTransition, arch_enter_signal_handler, arch_enter_user};

#[cfg(target_os = "none")]
mod hw {
    use kestrel_lib::{TrapFrame, cpu};

    use super::{PrivilegeTransition, enter_signal_handler, enter_user};
    use crate::arch::x86_64::resume::resume_user;

    pub struct HardwareTransition;

    impl PrivilegeTransition for HardwareTransition {
        fn store_user_word(&self, addr: u64, value: u64) {
            // SAFETY: the address lies in the current task's user stack,
            // mapped in the active address space.
            unsafe { (addr as *mut u64).write_volatile(value) }
        }

        fn iret(&self, frame: &TrapFrame) -> ! {
            cpu::disable_interrupts();
            // SAFETY: the frame sits on this kernel stack; nothing above it
            // is needed again once rsp points at it.
            unsafe {
                core::arch::asm!(
                    "mov rsp, {frame}",
                    "jmp {resume}",
                    frame = in(reg) frame as *const TrapFrame,
                    resume = sym resume_user,
                    options(noreturn),
                );
            }
        }
    }

    pub fn arch_enter_user(entry: u64, argc: u64, argv: u64, envp: u64, stack: u64) -> ! {
        enter_user(&HardwareTransition, entry, argc, argv, envp, stack)
    }

    pub fn arch_enter_signal_handler(entry: u64, signum: u64) -> ! {
        let frame = crate::scheduler::scheduler().and_then(|s| s.syscall_frame());
        let Some(frame) = frame else {
            crate::halt::fatal_with_message("signal delivery outside a syscall")
        };
        // SAFETY: the frame lives on the current task's kernel stack until
        // its syscall exits.
        let syscall_frame = unsafe { *frame };
        enter_signal_handler(&HardwareTransition, &syscall_frame, entry, signum)
    }
}
