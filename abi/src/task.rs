//! Task identifiers and the task state machine.
//!
//! The scheduler, the wait queues and the per-core records all name tasks
//! by [`TaskId`]; the state enum below is the single source of truth for
//! which transitions are legal.

// --- Task Configuration ---

pub const MAX_TASKS: usize = 64;
pub const TASK_KERNEL_STACK_SIZE: usize = 0x8000; // 32 KiB
pub const TASK_NAME_MAX_LEN: usize = 32;
pub const INVALID_TASK_ID: u32 = 0xFFFF_FFFF;

/// Stable handle into the task arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TaskId(pub u32);

impl TaskId {
    pub const INVALID: Self = Self(INVALID_TASK_ID);

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_TASK_ID
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        if raw == INVALID_TASK_ID {
            None
        } else {
            Some(Self(raw))
        }
    }
}

impl core::fmt::Display for TaskId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- TaskState ---

/// Scheduling state of a task.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TaskState {
    /// Runnable, waiting for a core.
    #[default]
    Ready = 1,
    /// Executing on exactly one core.
    Running = 2,
    /// Parked on a wait queue.
    Sleeping = 3,
    /// Exited, waiting to be reaped.
    Zombie = 4,
}

impl TaskState {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Ready => matches!(target, Self::Running),
            Self::Running => matches!(target, Self::Ready | Self::Sleeping | Self::Zombie),
            Self::Sleeping => matches!(target, Self::Ready),
            Self::Zombie => false,
        }
    }
}

/// What a task executes when it is resumed for the first time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Kernel-only worker, no user address space.
    KernelWorker,
    /// Per-core idle loop; never placed on the ready queue.
    Idle,
    /// User task created by fork/clone; first resume goes through `resume_user`.
    User,
}
