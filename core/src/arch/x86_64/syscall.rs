//! Syscall register convention.
//!
//! | Value | Register |
//! |-------|----------|
//! | number | rax |
//! | arg0..arg4 | rbx, rcx, rdx, rsi, rdi |
//! | return | rax |

use kestrel_lib::TrapFrame;

macro_rules! syscall_arg_accessors {
    ($($idx:literal => $reg:ident),* $(,)?) => {
        paste::paste! {
            $(
                #[inline(always)]
                pub fn [<syscall_arg $idx>](frame: &TrapFrame) -> u64 {
                    frame.$reg
                }
            )*
        }
    };
}

syscall_arg_accessors! {
    0 => rbx,
    1 => rcx,
    2 => rdx,
    3 => rsi,
    4 => rdi,
}

#[inline(always)]
pub fn syscall_number(frame: &TrapFrame) -> u64 {
    frame.rax
}

#[inline(always)]
pub fn syscall_return(frame: &mut TrapFrame, value: u64) {
    frame.rax = value;
}

#[inline(always)]
pub fn arch_stack_pointer(frame: &TrapFrame) -> u64 {
    frame.rsp
}

#[inline(always)]
pub fn arch_user_ip(frame: &TrapFrame) -> u64 {
    frame.rip
}

/// All five arguments in order.
#[inline]
pub fn syscall_args(frame: &TrapFrame) -> [u64; 5] {
    [
        syscall_arg0(frame),
        syscall_arg1(frame),
        syscall_arg2(frame),
        syscall_arg3(frame),
        syscall_arg4(frame),
    ]
}
