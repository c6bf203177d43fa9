//! Register-level context switch.
//!
//! The scheduler decides what to run under its lock, then hands a
//! [`SwitchRequest`] to a [`ContextSwitch`] implementation with the lock
//! released.  On bare metal that is [`HardwareSwitch`], a naked routine that
//! swaps callee-saved registers and the stack pointer.

use kestrel_abi::task::TaskId;

use super::task::SwitchContext;

/// One switch from `prev` to `next` on `cpu`.
#[derive(Debug, Clone, Copy)]
pub struct SwitchRequest {
    pub cpu: usize,
    pub prev: TaskId,
    pub next: TaskId,
    pub prev_ctx: *mut SwitchContext,
    pub next_ctx: *const SwitchContext,
}

pub trait ContextSwitch: Sync {
    /// Save the running registers into `req.prev_ctx` and resume
    /// `req.next_ctx`.  Returns when `prev` is next scheduled.
    ///
    /// # Safety
    /// Both contexts must stay valid until the switch completes; called with
    /// interrupts disabled and never re-entered on the same core.
    unsafe fn switch(&self, req: &SwitchRequest);
}

/// Value placed at the top of a fresh worker stack; `ret` in the switch
/// routine lands here on first resume.
#[inline]
pub fn worker_entry_address() -> u64 {
    #[cfg(target_os = "none")]
    {
        hw::task_entry_trampoline as usize as u64
    }
    #[cfg(not(target_os = "none"))]
    {
        0
    }
}

/// First-resume address of a cloned user task.
#[inline]
pub fn user_clone_entry_address() -> u64 {
    #[cfg(target_os = "none")]
    {
        hw::user_clone_trampoline as usize as u64
    }
    #[cfg(not(target_os = "none"))]
    {
        0
    }
}

#[cfg(target_os = "none")]
pub use hw::HardwareSwitch;

#[cfg(target_os = "none")]
mod hw {
    use core::arch::naked_asm;
    use core::mem::offset_of;

    use super::{ContextSwitch, SwitchContext, SwitchRequest};
    use crate::arch::x86_64::resume::resume_user;
    use crate::scheduler::scheduler::{finish_switch_here, worker_main};

    pub struct HardwareSwitch;

    impl ContextSwitch for HardwareSwitch {
        unsafe fn switch(&self, req: &SwitchRequest) {
            unsafe { switch_registers(req.prev_ctx, req.next_ctx) };
        }
    }

    /// Saves callee-saved registers, flags and stack pointer into `prev`,
    /// loads them from `next`, and returns on the new stack.
    #[unsafe(naked)]
    pub unsafe extern "sysv64" fn switch_registers(
        prev: *mut SwitchContext,
        next: *const SwitchContext,
    ) {
        naked_asm!(
            "mov [rdi + {off_rbx}], rbx",
            "mov [rdi + {off_r12}], r12",
            "mov [rdi + {off_r13}], r13",
            "mov [rdi + {off_r14}], r14",
            "mov [rdi + {off_r15}], r15",
            "mov [rdi + {off_rbp}], rbp",
            "mov [rdi + {off_rsp}], rsp",
            "pushfq",
            "pop QWORD PTR [rdi + {off_rflags}]",
            "mov rax, [rsp]",
            "mov [rdi + {off_rip}], rax",
            "mov rbx, [rsi + {off_rbx}]",
            "mov r12, [rsi + {off_r12}]",
            "mov r13, [rsi + {off_r13}]",
            "mov r14, [rsi + {off_r14}]",
            "mov r15, [rsi + {off_r15}]",
            "mov rbp, [rsi + {off_rbp}]",
            "push QWORD PTR [rsi + {off_rflags}]",
            "popfq",
            "mov rsp, [rsi + {off_rsp}]",
            "ret",
            off_rbx = const offset_of!(SwitchContext, rbx),
            off_r12 = const offset_of!(SwitchContext, r12),
            off_r13 = const offset_of!(SwitchContext, r13),
            off_r14 = const offset_of!(SwitchContext, r14),
            off_r15 = const offset_of!(SwitchContext, r15),
            off_rbp = const offset_of!(SwitchContext, rbp),
            off_rsp = const offset_of!(SwitchContext, rsp),
            off_rflags = const offset_of!(SwitchContext, rflags),
            off_rip = const offset_of!(SwitchContext, rip),
        );
    }

    /// r12 = worker entry, r13 = its argument.
    #[unsafe(naked)]
    pub extern "sysv64" fn task_entry_trampoline() {
        naked_asm!(
            "mov rdi, r12",
            "mov rsi, r13",
            "call {main}",
            "ud2",
            main = sym worker_main,
        );
    }

    /// rsp points at the child's trap frame.  Interrupts stay off through
    /// `swapgs; iretq`; the frame's rflags turns them back on in user mode.
    #[unsafe(naked)]
    pub extern "sysv64" fn user_clone_trampoline() {
        naked_asm!(
            "cli",
            "call {finish}",
            "jmp {resume}",
            finish = sym finish_switch_here,
            resume = sym resume_user,
        );
    }
}
