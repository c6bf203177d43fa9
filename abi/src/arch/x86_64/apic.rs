//! Local APIC interrupt command register (ICR) encoding.
//!
//! Only the low dword matters for the IPIs the core sends; the destination
//! APIC id goes into bits 24-31 of the high dword and is supplied separately.

use bitflags::bitflags;

use super::idt::FATAL_HALT_VECTOR;

bitflags! {
    /// ICR low-dword control bits (everything above the vector byte).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IcrFlags: u32 {
        /// Delivery mode 100b: NMI, ignores the target's IF flag.
        const DELIVERY_NMI = 0b100 << 8;
        /// Delivery mode 101b: INIT.
        const DELIVERY_INIT = 0b101 << 8;
        const DEST_LOGICAL = 1 << 11;
        const DELIVERY_PENDING = 1 << 12;
        const LEVEL_ASSERT = 1 << 14;
        const TRIGGER_LEVEL = 1 << 15;
    }
}

/// A complete ICR low-dword command: vector plus control bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct IcrCommand(pub u32);

impl IcrCommand {
    /// Fixed delivery of `vector`, level assert.
    #[inline]
    pub const fn fixed(vector: u8) -> Self {
        Self(IcrFlags::LEVEL_ASSERT.bits() | vector as u32)
    }

    /// NMI delivery, level assert; the vector byte is carried but ignored
    /// by the receiving core.
    #[inline]
    pub const fn nmi(vector: u8) -> Self {
        Self(IcrFlags::DELIVERY_NMI.bits() | IcrFlags::LEVEL_ASSERT.bits() | vector as u32)
    }

    #[inline]
    pub const fn vector(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    #[inline]
    pub const fn is_nmi(self) -> bool {
        (self.0 & (0b111 << 8)) == IcrFlags::DELIVERY_NMI.bits()
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Stop directive broadcast by the fatal-halt path.
pub const FATAL_HALT_IPI: IcrCommand = IcrCommand::nmi(FATAL_HALT_VECTOR);

const _: () = assert!(FATAL_HALT_IPI.bits() == 0x447D);
