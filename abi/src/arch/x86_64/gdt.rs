//! Segment selectors for the kernel GDT.
//!
//! The GDT itself is built by the boot code; only the selector values are
//! part of the contract between the trap layer and the entry stubs.
//!
//! | Index | Selector | Segment |
//! |-------|----------|---------|
//! | 1 | `0x08` | kernel code |
//! | 2 | `0x10` | kernel data |
//! | 3 | `0x1B` | user code (RPL 3) |
//! | 4 | `0x23` | user data (RPL 3) |

/// x86_64 segment selector.
///
/// Layout (16 bits):
/// - Bits 0-1: Requested Privilege Level (RPL)
/// - Bit 2: Table Indicator (0 = GDT, 1 = LDT)
/// - Bits 3-15: Descriptor index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SegmentSelector(pub u16);

impl SegmentSelector {
    /// Null selector (index 0, GDT, RPL 0).
    pub const NULL: Self = Self(0);

    /// Kernel code segment (GDT index 1, RPL 0) = 0x08.
    pub const KERNEL_CODE: Self = Self::new(1, false, 0);

    /// Kernel data segment (GDT index 2, RPL 0) = 0x10.
    pub const KERNEL_DATA: Self = Self::new(2, false, 0);

    /// User code segment (GDT index 3, RPL 3) = 0x1B.
    pub const USER_CODE: Self = Self::new(3, false, 3);

    /// User data/stack segment (GDT index 4, RPL 3) = 0x23.
    pub const USER_DATA: Self = Self::new(4, false, 3);

    #[inline]
    pub const fn new(index: u16, ldt: bool, rpl: u8) -> Self {
        let ti = if ldt { 1 << 2 } else { 0 };
        Self((index << 3) | ti | (rpl as u16 & 0x3))
    }

    #[inline]
    pub const fn index(self) -> u16 {
        self.0 >> 3
    }

    /// Requested privilege level (0-3).
    #[inline]
    pub const fn rpl(self) -> u8 {
        (self.0 & 0x3) as u8
    }

    #[inline]
    pub const fn is_user(self) -> bool {
        self.rpl() == 3
    }

    /// Raw selector value as stored in a trap frame slot.
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_frame(raw: u64) -> Self {
        Self(raw as u16)
    }
}

const _: () = {
    assert!(SegmentSelector::KERNEL_CODE.bits() == 0x08);
    assert!(SegmentSelector::KERNEL_DATA.bits() == 0x10);
    assert!(SegmentSelector::USER_CODE.bits() == 0x18 | 0x03);
    assert!(SegmentSelector::USER_DATA.bits() == 0x20 | 0x03);
};

/// Returns true if `(cs, ss)` is a pair the CPU will accept on `iretq`:
/// both user (RPL 3, user segments) or both kernel.
#[inline]
pub const fn is_valid_ring_pair(cs: SegmentSelector, ss: SegmentSelector) -> bool {
    let user = cs.bits() == SegmentSelector::USER_CODE.bits()
        && ss.bits() == SegmentSelector::USER_DATA.bits();
    let kernel = cs.bits() == SegmentSelector::KERNEL_CODE.bits()
        && ss.bits() == SegmentSelector::KERNEL_DATA.bits();
    user || kernel
}
