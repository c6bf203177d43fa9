//! Task records and the fixed-capacity task arena.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::mem::offset_of;

use kestrel_abi::arch::RFlags;
use kestrel_abi::task::{
    INVALID_TASK_ID, MAX_TASKS, TASK_KERNEL_STACK_SIZE, TASK_NAME_MAX_LEN, TaskId, TaskKind,
    TaskState,
};
use kestrel_lib::cpu::FxSaveArea;

use super::scheduler::SpawnError;

// =============================================================================
// SwitchContext — callee-saved registers for the software context switch
// =============================================================================

/// Layout is read by the naked switch routine through `offset_of!`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwitchContext {
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub rflags: u64,
    pub rip: u64,
}

impl SwitchContext {
    pub const fn zero() -> Self {
        Self {
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rbp: 0,
            rsp: 0,
            rflags: RFlags::KERNEL_TASK.bits(),
            rip: 0,
        }
    }

    /// First-resume context: `ret` from the switch pops the word at `rsp`.
    pub const fn first_resume(rsp: u64, rip: u64, r12: u64, r13: u64) -> Self {
        Self {
            rbx: 0,
            r12,
            r13,
            r14: 0,
            r15: 0,
            rbp: 0,
            rsp,
            rflags: RFlags::KERNEL_TASK.bits(),
            rip,
        }
    }
}

const _: () = {
    assert!(core::mem::size_of::<SwitchContext>() == 72);
    assert!(offset_of!(SwitchContext, rbx) == 0);
    assert!(offset_of!(SwitchContext, rsp) == 48);
    assert!(offset_of!(SwitchContext, rip) == 64);
};

// =============================================================================
// Kernel stacks
// =============================================================================

/// Heap-backed, 16-byte aligned kernel stack.
pub struct KernelStack {
    mem: Box<[u128]>,
}

impl KernelStack {
    /// Allocation failure is reported instead of aborting.
    pub fn allocate() -> Result<Self, SpawnError> {
        let slots = TASK_KERNEL_STACK_SIZE / core::mem::size_of::<u128>();
        let mut mem: Vec<u128> = Vec::new();
        mem.try_reserve_exact(slots)
            .map_err(|_| SpawnError::OutOfMemory)?;
        mem.resize(slots, 0);
        Ok(Self {
            mem: mem.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.mem.as_ptr() as u64
    }

    #[inline]
    pub fn top(&self) -> u64 {
        self.base() + TASK_KERNEL_STACK_SIZE as u64
    }

    /// The stack as 64-bit words, lowest address first.
    pub fn words_mut(&mut self) -> &mut [u64] {
        let len = self.mem.len() * 2;
        // SAFETY: u128 storage reinterpreted as twice as many u64 words;
        // alignment only decreases.
        unsafe { core::slice::from_raw_parts_mut(self.mem.as_mut_ptr().cast::<u64>(), len) }
    }
}

// =============================================================================
// Task
// =============================================================================

pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    name: [u8; TASK_NAME_MAX_LEN],
    name_len: usize,
    pub ctx: SwitchContext,
    pub fpu: FxSaveArea,
    stack: Option<KernelStack>,
    /// Identity of the wait queue this task is parked on.
    pub wait_queue: Option<usize>,
    /// Core whose registers currently hold this task's context.
    pub on_cpu: Option<usize>,
    pub exit_code: Option<i32>,
    pub slice_left: u32,
    /// Address of the trap frame of the syscall this task is inside.
    pub syscall_frame: Option<usize>,
}

impl Task {
    pub fn new(id: TaskId, kind: TaskKind, name: &str, stack: Option<KernelStack>) -> Self {
        let mut buf = [0u8; TASK_NAME_MAX_LEN];
        let mut len = name.len().min(TASK_NAME_MAX_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        buf[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            id,
            kind,
            state: TaskState::Ready,
            name: buf,
            name_len: len,
            ctx: SwitchContext::zero(),
            fpu: FxSaveArea::initial(),
            stack,
            wait_queue: None,
            on_cpu: None,
            exit_code: None,
            slice_left: 0,
            syscall_frame: None,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("?")
    }

    pub fn stack_mut(&mut self) -> Option<&mut KernelStack> {
        self.stack.as_mut()
    }

    pub fn is_idle(&self) -> bool {
        self.kind == TaskKind::Idle
    }

    /// Move to `target` if the state machine allows it.
    pub fn transition(&mut self, target: TaskState) -> bool {
        if self.state == target {
            return true;
        }
        if !self.state.can_transition_to(target) {
            return false;
        }
        self.state = target;
        true
    }
}

// =============================================================================
// Arena
// =============================================================================

/// Fixed table of task slots.
///
/// A `TaskId` encodes its slot in the low bits and a per-slot generation
/// above them, so a stale id never resolves to a later occupant.
pub struct TaskTable {
    slots: [Option<Task>; MAX_TASKS],
    generation: [u32; MAX_TASKS],
    live: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; MAX_TASKS],
            generation: [0; MAX_TASKS],
            live: 0,
        }
    }

    #[inline]
    fn slot_of(id: TaskId) -> usize {
        id.raw() as usize % MAX_TASKS
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_full(&self) -> bool {
        self.live == MAX_TASKS
    }

    /// Claim a free slot; `build` receives the id the task will carry.
    pub fn insert(&mut self, build: impl FnOnce(TaskId) -> Task) -> Result<TaskId, SpawnError> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SpawnError::TableFull)?;
        let mut raw = self.generation[slot]
            .wrapping_mul(MAX_TASKS as u32)
            .wrapping_add(slot as u32);
        if raw == INVALID_TASK_ID {
            self.generation[slot] = 0;
            raw = slot as u32;
        }
        let id = TaskId(raw);
        self.slots[slot] = Some(build(id));
        self.live += 1;
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.slots[Self::slot_of(id)]
            .as_ref()
            .filter(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.slots[Self::slot_of(id)]
            .as_mut()
            .filter(|t| t.id == id)
    }

    /// Free the slot and bump its generation.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let slot = Self::slot_of(id);
        if self.get(id).is_none() {
            return None;
        }
        self.generation[slot] = self.generation[slot].wrapping_add(1);
        self.live -= 1;
        self.slots[slot].take()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter().flatten()
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
