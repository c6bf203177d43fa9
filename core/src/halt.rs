//! Fatal-halt coordination.
//!
//! `NORMAL → FREEZING → HALTED`, terminal.  The first core to call
//! [`FatalHalt::prepare`] wins the transition and sends the stop IPI
//! ([`FATAL_HALT_IPI`], NMI delivery) to every other online core.  From the
//! moment the state leaves NORMAL the scheduler rejects mutations and the
//! interrupt router drops deliveries, so nothing moves while diagnostics are
//! printed.

use core::sync::atomic::{AtomicU8, Ordering};

use kestrel_abi::arch::{FATAL_HALT_IPI, IcrCommand};
use kestrel_lib::pcr::{self, CoreTable, PerCoreState};
use kestrel_lib::{TrapFrame, cpu, kdiag_dump_trap_frame, klog_error};

pub trait IpiSender: Sync {
    fn send_ipi(&self, lapic_id: u32, command: IcrCommand);
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltState {
    Normal = 0,
    Freezing = 1,
    Halted = 2,
}

impl HaltState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => HaltState::Normal,
            1 => HaltState::Freezing,
            _ => HaltState::Halted,
        }
    }
}

pub struct FatalHalt {
    state: AtomicU8,
}

impl FatalHalt {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(HaltState::Normal as u8),
        }
    }

    #[inline]
    pub fn state(&self) -> HaltState {
        HaltState::from_raw(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.state.load(Ordering::Acquire) != HaltState::Normal as u8
    }

    /// Stop every other online core.  Returns true for the caller that
    /// performed the broadcast; later callers get false and should park.
    pub fn prepare(&self, cores: &CoreTable, ipi: &dyn IpiSender, cpu: usize) -> bool {
        if self
            .state
            .compare_exchange(
                HaltState::Normal as u8,
                HaltState::Freezing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        for core in cores.online() {
            if core.cpu_id as usize == cpu {
                continue;
            }
            ipi.send_ipi(core.lapic_id(), FATAL_HALT_IPI);
        }
        true
    }

    /// Record that `core` is about to halt for good.  The initiating core
    /// also moves the machine to HALTED.
    pub fn park(&self, core: Option<&PerCoreState>, initiator: bool) {
        if let Some(core) = core {
            core.mark_halted();
        }
        if initiator {
            self.state.store(HaltState::Halted as u8, Ordering::Release);
        }
    }
}

impl Default for FatalHalt {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Machine-wide instance
// =============================================================================

pub static FATAL: FatalHalt = FatalHalt::new();

static IPI_SENDER: spin::Once<&'static dyn IpiSender> = spin::Once::new();

/// Install the local-APIC IPI path used by the stop broadcast.
pub fn register_ipi_sender(sender: &'static dyn IpiSender) {
    IPI_SENDER.call_once(|| sender);
}

struct NoIpi;

impl IpiSender for NoIpi {
    fn send_ipi(&self, _lapic_id: u32, _command: IcrCommand) {}
}

/// Freeze every other core.  Safe to call from any core, any number of
/// times; only the first call broadcasts.
pub fn fatal_prepare() -> bool {
    let ipi: &dyn IpiSender = IPI_SENDER.get().copied().unwrap_or(&NoIpi);
    FATAL.prepare(&pcr::CORES, ipi, pcr::current_cpu())
}

/// Freeze all cores, then halt this one.
pub fn fatal() -> ! {
    let initiator = fatal_prepare();
    FATAL.park(pcr::CORES.get(pcr::current_cpu()), initiator);
    cpu::halt_forever()
}

pub fn fatal_with_message(msg: &str) -> ! {
    let initiator = fatal_prepare();
    klog_error!("FATAL: {}", msg);
    FATAL.park(pcr::CORES.get(pcr::current_cpu()), initiator);
    cpu::halt_forever()
}

/// Freeze all cores, dump `frame`, halt.
pub fn fatal_with_frame(frame: &TrapFrame, msg: &str) -> ! {
    let initiator = fatal_prepare();
    klog_error!("FATAL: {} on cpu {}", msg, pcr::current_cpu());
    kdiag_dump_trap_frame(frame);
    FATAL.park(pcr::CORES.get(pcr::current_cpu()), initiator);
    cpu::halt_forever()
}

/// NMI path of a core receiving the stop IPI.
pub fn fatal_ipi_received() -> ! {
    cpu::disable_interrupts();
    FATAL.park(pcr::CORES.get(pcr::current_cpu()), false);
    cpu::halt_forever()
}
