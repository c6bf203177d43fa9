//! Return-to-user tail shared by fork/clone children and engineered frames.
//!
//! The register block is consumed in the order the entry stubs pushed it:
//! fifteen general-purpose registers, then `int_no`/`err_code` (discarded),
//! then the five-word hardware frame for `iretq`.

use kestrel_lib::kdiag::{TRAP_FRAME_WORDS, TrapFrame};

/// Lay out a cloned task's first-resume stack in `stack` (64-bit words,
/// lowest address first): the trap frame at the very top, and below it the
/// address the context switch `ret`s into.  Returns the word index of the
/// initial stack pointer.
pub fn build_clone_stack(stack: &mut [u64], frame: &TrapFrame, entry: u64) -> usize {
    let frame_start = stack.len() - TRAP_FRAME_WORDS;
    stack[frame_start..].copy_from_slice(&frame.to_words());
    stack[frame_start - 1] = entry;
    frame_start - 1
}

/// Pop the register block at rsp, drop `int_no`/`err_code`, `swapgs`,
/// `iretq`.  Entered by jump with rsp at a [`TrapFrame`].
#[cfg(target_os = "none")]
#[unsafe(naked)]
pub unsafe extern "sysv64" fn resume_user() -> ! {
    core::arch::naked_asm!(
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rbp",
        "pop rdi",
        "pop rsi",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "add rsp, 16",
        "swapgs",
        "iretq",
    );
}
