//! Trap frame layout and diagnostic dumps.

use kestrel_abi::arch::{RFlags, SegmentSelector};

/// Register snapshot saved at every kernel entry.
///
/// Field order is the push order of the entry stubs, lowest address first:
/// the fifteen general-purpose registers, then the vector number and error
/// code pushed by the stub, then the five words pushed by the CPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub int_no: u64,
    pub err_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

pub const TRAP_FRAME_WORDS: usize = 22;
pub const TRAP_FRAME_GPR_WORDS: usize = 15;
pub const TRAP_FRAME_SIZE: usize = TRAP_FRAME_WORDS * 8;

const _: () = {
    assert!(core::mem::size_of::<TrapFrame>() == TRAP_FRAME_SIZE);
    assert!(core::mem::offset_of!(TrapFrame, rax) == 14 * 8);
    assert!(core::mem::offset_of!(TrapFrame, int_no) == TRAP_FRAME_GPR_WORDS * 8);
    assert!(core::mem::offset_of!(TrapFrame, rip) == 17 * 8);
    assert!(core::mem::offset_of!(TrapFrame, ss) == 21 * 8);
};

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            int_no: 0,
            err_code: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }

    /// Frame as a flat word array in memory order.
    pub fn to_words(&self) -> [u64; TRAP_FRAME_WORDS] {
        [
            self.r15,
            self.r14,
            self.r13,
            self.r12,
            self.r11,
            self.r10,
            self.r9,
            self.r8,
            self.rbp,
            self.rdi,
            self.rsi,
            self.rdx,
            self.rcx,
            self.rbx,
            self.rax,
            self.int_no,
            self.err_code,
            self.rip,
            self.cs,
            self.rflags,
            self.rsp,
            self.ss,
        ]
    }

    pub fn from_words(w: &[u64; TRAP_FRAME_WORDS]) -> Self {
        Self {
            r15: w[0],
            r14: w[1],
            r13: w[2],
            r12: w[3],
            r11: w[4],
            r10: w[5],
            r9: w[6],
            r8: w[7],
            rbp: w[8],
            rdi: w[9],
            rsi: w[10],
            rdx: w[11],
            rcx: w[12],
            rbx: w[13],
            rax: w[14],
            int_no: w[15],
            err_code: w[16],
            rip: w[17],
            cs: w[18],
            rflags: w[19],
            rsp: w[20],
            ss: w[21],
        }
    }

    #[inline]
    pub fn from_user_mode(&self) -> bool {
        SegmentSelector::from_frame(self.cs).is_user()
    }

    #[inline]
    pub fn interrupts_enabled(&self) -> bool {
        RFlags::from_bits_retain(self.rflags).contains(RFlags::INTERRUPT_ENABLE)
    }
}

pub fn exception_name(vector: u8) -> &'static str {
    match vector {
        0 => "Divide Error",
        1 => "Debug",
        2 => "NMI",
        3 => "Breakpoint",
        4 => "Overflow",
        5 => "Bound Range",
        6 => "Invalid Opcode",
        7 => "Device Not Available",
        8 => "Double Fault",
        10 => "Invalid TSS",
        11 => "Segment Not Present",
        12 => "Stack Fault",
        13 => "General Protection",
        14 => "Page Fault",
        16 => "FPU Error",
        17 => "Alignment Check",
        18 => "Machine Check",
        19 => "SIMD FP Exception",
        0x20..=0x2F => "IRQ",
        0x7D => "Fatal Halt IPI",
        0x80 => "Syscall",
        _ => "Unknown",
    }
}

pub fn kdiag_dump_trap_frame(f: &TrapFrame) {
    crate::klog_error!("=== TRAP FRAME DUMP ===");
    crate::klog_error!(
        "Vector: {} ({}) Error Code: 0x{:x}",
        f.int_no,
        exception_name(f.int_no as u8),
        f.err_code
    );
    crate::klog_error!(
        "RIP: 0x{:x}  CS: 0x{:x} ({})  RFLAGS: 0x{:x}",
        f.rip,
        f.cs,
        if f.from_user_mode() { "user" } else { "kernel" },
        f.rflags
    );
    crate::klog_error!("RSP: 0x{:x}  SS: 0x{:x}", f.rsp, f.ss);
    crate::klog_error!("RAX: 0x{:x}  RBX: 0x{:x}  RCX: 0x{:x}", f.rax, f.rbx, f.rcx);
    crate::klog_error!("RDX: 0x{:x}  RSI: 0x{:x}  RDI: 0x{:x}", f.rdx, f.rsi, f.rdi);
    crate::klog_error!("RBP: 0x{:x}  R8 : 0x{:x}  R9 : 0x{:x}", f.rbp, f.r8, f.r9);
    crate::klog_error!("R10: 0x{:x}  R11: 0x{:x}  R12: 0x{:x}", f.r10, f.r11, f.r12);
    crate::klog_error!("R13: 0x{:x}  R14: 0x{:x}  R15: 0x{:x}", f.r13, f.r14, f.r15);
    crate::klog_error!("=== END TRAP FRAME DUMP ===");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_order_matches_push_order() {
        let mut f = TrapFrame::zeroed();
        f.r15 = 1;
        f.rax = 15;
        f.int_no = 0x80;
        f.ss = 0x23;
        let w = f.to_words();
        assert_eq!(w[0], 1);
        assert_eq!(w[14], 15);
        assert_eq!(w[15], 0x80);
        assert_eq!(w[21], 0x23);
        assert_eq!(TrapFrame::from_words(&w), f);
    }

    #[test]
    fn user_mode_detection() {
        let mut f = TrapFrame::zeroed();
        f.cs = SegmentSelector::KERNEL_CODE.bits() as u64;
        assert!(!f.from_user_mode());
        f.cs = SegmentSelector::USER_CODE.bits() as u64;
        assert!(f.from_user_mode());
    }

    #[test]
    fn names() {
        assert_eq!(exception_name(14), "Page Fault");
        assert_eq!(exception_name(0x24), "IRQ");
        assert_eq!(exception_name(0xFF), "Unknown");
    }
}
