//! Per-core state.
//!
//! One [`PerCoreState`] per logical processor, in a fixed core-indexed
//! table.  A core writes only its own record; other cores read them during
//! fatal-halt (to find APIC ids) and diagnostics.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};

use kestrel_abi::task::{INVALID_TASK_ID, TaskId};

pub const MAX_CPUS: usize = 16;

pub struct PerCoreState {
    pub cpu_id: u32,
    lapic_id: AtomicU32,
    online: AtomicBool,
    current_task: AtomicU32,
    reschedule_pending: AtomicBool,
    halted: AtomicBool,
    pub interrupt_count: AtomicU64,
}

impl PerCoreState {
    pub const fn new(cpu_id: u32) -> Self {
        Self {
            cpu_id,
            lapic_id: AtomicU32::new(0),
            online: AtomicBool::new(false),
            current_task: AtomicU32::new(INVALID_TASK_ID),
            reschedule_pending: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            interrupt_count: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn lapic_id(&self) -> u32 {
        self.lapic_id.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    #[inline]
    pub fn current_task(&self) -> Option<TaskId> {
        TaskId::from_raw(self.current_task.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_current_task(&self, id: Option<TaskId>) {
        let raw = id.map_or(INVALID_TASK_ID, TaskId::raw);
        self.current_task.store(raw, Ordering::Release);
    }

    #[inline]
    pub fn set_reschedule_pending(&self) {
        self.reschedule_pending.store(true, Ordering::Release);
    }

    /// Clear the pending flag, returning whether it was set.
    #[inline]
    pub fn take_reschedule_pending(&self) -> bool {
        self.reschedule_pending.swap(false, Ordering::AcqRel)
    }

    #[inline]
    pub fn reschedule_pending(&self) -> bool {
        self.reschedule_pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn mark_halted(&self) {
        self.halted.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

pub struct CoreTable {
    cores: [PerCoreState; MAX_CPUS],
    online_count: AtomicU32,
}

impl CoreTable {
    pub const fn new() -> Self {
        let mut cores = [const { PerCoreState::new(0) }; MAX_CPUS];
        let mut i = 0;
        while i < MAX_CPUS {
            cores[i] = PerCoreState::new(i as u32);
            i += 1;
        }
        Self {
            cores,
            online_count: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn get(&self, cpu: usize) -> Option<&PerCoreState> {
        self.cores.get(cpu)
    }

    /// Record `cpu` as online with the given local APIC id.  Returns false
    /// for an out-of-range index or a core that is already online.
    pub fn bring_online(&self, cpu: usize, lapic_id: u32) -> bool {
        let Some(core) = self.cores.get(cpu) else {
            return false;
        };
        core.lapic_id.store(lapic_id, Ordering::Release);
        if core.online.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.online_count.fetch_add(1, Ordering::AcqRel);
        true
    }

    #[inline]
    pub fn online_count(&self) -> u32 {
        self.online_count.load(Ordering::Acquire)
    }

    pub fn online(&self) -> impl Iterator<Item = &PerCoreState> {
        self.cores.iter().filter(|c| c.is_online())
    }
}

impl Default for CoreTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The machine's core table.
pub static CORES: CoreTable = CoreTable::new();

pub type CpuIndexFn = fn() -> usize;

static CPU_INDEX_FN: AtomicPtr<()> = AtomicPtr::new(ptr::null_mut());

/// Install the routine that reports the executing core's index.  Until one
/// is registered every caller is treated as the bootstrap core.
pub fn register_cpu_index_fn(f: CpuIndexFn) {
    CPU_INDEX_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
pub fn current_cpu() -> usize {
    let p = CPU_INDEX_FN.load(Ordering::Acquire);
    if p.is_null() {
        return 0;
    }
    // SAFETY: only `register_cpu_index_fn` stores here, always a `CpuIndexFn`.
    let f: CpuIndexFn = unsafe { core::mem::transmute(p) };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bring_online_counts_once() {
        let table = CoreTable::new();
        assert!(table.bring_online(0, 0));
        assert!(table.bring_online(3, 7));
        assert!(!table.bring_online(3, 7));
        assert!(!table.bring_online(MAX_CPUS, 1));
        assert_eq!(table.online_count(), 2);
        let ids: Vec<u32> = table.online().map(|c| c.lapic_id()).collect();
        assert_eq!(ids, vec![0, 7]);
        assert_eq!(table.get(3).map(|c| c.cpu_id), Some(3));
    }

    #[test]
    fn reschedule_flag_is_consumed() {
        let core = PerCoreState::new(0);
        assert!(!core.take_reschedule_pending());
        core.set_reschedule_pending();
        assert!(core.reschedule_pending());
        assert!(core.take_reschedule_pending());
        assert!(!core.reschedule_pending());
    }

    #[test]
    fn current_task_round_trips_sentinel() {
        let core = PerCoreState::new(1);
        assert_eq!(core.current_task(), None);
        core.set_current_task(Some(TaskId(4)));
        assert_eq!(core.current_task(), Some(TaskId(4)));
        core.set_current_task(None);
        assert_eq!(core.current_task(), None);
    }
}
