use bitflags::bitflags;

bitflags! {
    /// Subset of RFLAGS the kernel writes into constructed frames.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RFlags: u64 {
        /// Reserved bit 1, always reads as one.
        const RESERVED_1 = 1 << 1;
        const INTERRUPT_ENABLE = 1 << 9;
        const DIRECTION = 1 << 10;
        /// CPUID-available bit; kept set so user code can use CPUID.
        const ID = 1 << 21;
    }
}

impl RFlags {
    /// Flags loaded on every kernel-to-user transition.
    pub const USER_ENTRY: Self = Self::from_bits_retain((1 << 21) | (1 << 9));

    /// Flags for a freshly created task's switch context.  Interrupts stay
    /// off until the entry path has run `finish_switch`.
    pub const KERNEL_TASK: Self = Self::from_bits_retain(1 << 1);
}
