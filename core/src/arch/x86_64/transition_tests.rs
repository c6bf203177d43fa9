use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;

use kestrel_abi::arch::{RFlags, SegmentSelector};
use kestrel_abi::signal::SIGNAL_RETURN_SENTINEL;
use kestrel_lib::kdiag::{TRAP_FRAME_GPR_WORDS, TRAP_FRAME_WORDS, TrapFrame};

use super::resume::build_clone_stack;
use super::user::{
    PrivilegeTransition, build_signal_frame, enter_signal_handler, enter_user, is_signal_return,
};

/// Records what would have been loaded, then unwinds in place of `iretq`.
#[derive(Default)]
struct RecordingTransition {
    stores: Mutex<Vec<(u64, u64)>>,
    frames: Mutex<Vec<TrapFrame>>,
}

struct Iret;

impl PrivilegeTransition for RecordingTransition {
    fn store_user_word(&self, addr: u64, value: u64) {
        self.stores.lock().unwrap().push((addr, value));
    }

    fn iret(&self, frame: &TrapFrame) -> ! {
        self.frames.lock().unwrap().push(*frame);
        std::panic::panic_any(Iret)
    }
}

fn capture(f: impl FnOnce()) {
    let err = catch_unwind(AssertUnwindSafe(f)).expect_err("transition must not return");
    assert!(err.is::<Iret>());
}

fn syscall_frame_at(rsp: u64) -> TrapFrame {
    TrapFrame {
        rsp,
        rip: 0x40_2000,
        rax: 39,
        cs: SegmentSelector::USER_CODE.bits() as u64,
        ss: SegmentSelector::USER_DATA.bits() as u64,
        rflags: RFlags::USER_ENTRY.bits(),
        ..TrapFrame::zeroed()
    }
}

#[test]
fn user_entry_frame_targets_ring3() {
    let pt = RecordingTransition::default();
    capture(|| enter_user(&pt, 0x40_1000, 2, 0x7fff_f000, 0x7fff_f100, 0x7fff_fff0));

    let frames = pt.frames.lock().unwrap();
    let f = frames[0];
    assert_eq!(f.rip, 0x40_1000);
    assert_eq!(f.rsp, 0x7fff_fff0);
    assert_eq!(f.cs, 0x1B);
    assert_eq!(f.ss, 0x23);
    assert_eq!(f.rflags, 0x20_0200);
    assert!(f.interrupts_enabled());
    assert_eq!((f.rdi, f.rsi, f.rdx), (2, 0x7fff_f000, 0x7fff_f100));
    assert_eq!((f.rax, f.rbx, f.rcx), (0, 0, 0));
    assert!(pt.stores.lock().unwrap().is_empty());
}

#[test]
fn signal_frame_skips_red_zone_and_is_call_aligned() {
    for offset in 0..48u64 {
        let user_rsp = 0x7fff_ffff_e000 - offset;
        let f = build_signal_frame(&syscall_frame_at(user_rsp), 0x40_3000, 10);
        assert_eq!((f.rsp + 8) % 16, 0, "rsp {:#x}", user_rsp);
        assert!(f.rsp + 8 <= user_rsp - 128, "red zone overlap at {:#x}", user_rsp);
        assert!(user_rsp - 128 - (f.rsp + 8) < 16);
        assert_eq!(f.rip, 0x40_3000);
        assert_eq!(f.rdi, 10);
        assert!(f.from_user_mode());
    }
}

#[test]
fn signal_frame_from_low_user_rsp_wraps_instead_of_panicking() {
    for user_rsp in [0u64, 0x8, 0x40, 0x7f] {
        let f = build_signal_frame(&syscall_frame_at(user_rsp), 0x40_3000, 11);
        assert_eq!(f.rsp.wrapping_add(8) % 16, 0, "rsp {:#x}", user_rsp);
        assert_eq!(f.rsp, (user_rsp.wrapping_sub(128) & !15).wrapping_sub(8));
        assert_eq!(f.rdi, 11);
    }
}

#[test]
fn signal_entry_plants_sentinel_at_new_rsp() {
    let pt = RecordingTransition::default();
    let sys = syscall_frame_at(0x7fff_ffff_d00c);
    capture(|| enter_signal_handler(&pt, &sys, 0x40_3000, 2));

    let f = pt.frames.lock().unwrap()[0];
    assert_eq!(f.rsp, ((0x7fff_ffff_d00c - 128) & !15) - 8);
    assert_eq!(
        pt.stores.lock().unwrap().as_slice(),
        &[(f.rsp, SIGNAL_RETURN_SENTINEL)]
    );
    assert_eq!(f.rdi, 2);
}

#[test]
fn sentinel_lies_outside_user_layout() {
    let user_ranges = [
        (0x40_0000u64, 0x80_0000u64),
        (0x1000_0000, 0x2000_0000),
        (0x7000_0000_0000, 0x7000_4000_0000),
        (0x7fff_f000_0000, 0x8000_0000_0000),
    ];
    for (start, end) in user_ranges {
        assert!(!(start..end).contains(&SIGNAL_RETURN_SENTINEL));
    }

    let mut fault = syscall_frame_at(0x7fff_0000);
    fault.rip = SIGNAL_RETURN_SENTINEL;
    assert!(is_signal_return(&fault));

    fault.rip = SIGNAL_RETURN_SENTINEL + 8;
    assert!(!is_signal_return(&fault));

    fault.rip = SIGNAL_RETURN_SENTINEL;
    fault.cs = SegmentSelector::KERNEL_CODE.bits() as u64;
    assert!(!is_signal_return(&fault));
}

#[test]
fn clone_stack_unwinds_into_the_child_frame() {
    let mut child = syscall_frame_at(0x7fff_8000);
    child.rax = 0;
    child.r15 = 15;
    child.rbx = 0xB;
    child.int_no = 0x80;

    let mut stack = vec![0u64; 64];
    let rsp = build_clone_stack(&mut stack, &child, 0xE17E);
    assert_eq!(stack[rsp], 0xE17E);
    assert_eq!(rsp + 1 + TRAP_FRAME_WORDS, stack.len());

    // ret, then the resume tail: 15 pops, skip int_no/err_code, iretq.
    let mut sp = rsp + 1;
    let gprs = &stack[sp..sp + TRAP_FRAME_GPR_WORDS];
    sp += TRAP_FRAME_GPR_WORDS + 2;
    let hw = &stack[sp..sp + 5];

    let expected = child.to_words();
    assert_eq!(gprs, &expected[..TRAP_FRAME_GPR_WORDS]);
    assert_eq!(gprs[0], 15);
    assert_eq!(gprs[TRAP_FRAME_GPR_WORDS - 1], 0);
    assert_eq!(hw, &[child.rip, child.cs, child.rflags, child.rsp, child.ss]);
    assert_eq!(sp + 5, stack.len());
}
