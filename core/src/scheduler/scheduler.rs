//! Scheduler core: run queue, per-core current task, state machine.
//!
//! All task state and wait-queue membership change under one `IrqMutex`.
//! Switch decisions are made under the lock; the register switch itself
//! runs after the guard drops, with interrupts still off until the resumed
//! side has run [`Scheduler::finish_switch`].  A task switched away from keeps its
//! `on_cpu` marker until the resumed side calls [`Scheduler::finish_switch`],
//! so no other core can pick it while its registers are still live.

use core::sync::atomic::{AtomicU64, Ordering};

use kestrel_abi::task::{MAX_TASKS, TaskId, TaskKind, TaskState};
use kestrel_lib::kdiag::TrapFrame;
use kestrel_lib::pcr::{CoreTable, MAX_CPUS};
use kestrel_lib::{IrqMutex, cpu, klog_debug, klog_info, klog_warn};

use super::context::{TaskCx, WorkerEntry};
use super::switch::{ContextSwitch, SwitchRequest, user_clone_entry_address, worker_entry_address};
use super::task::{KernelStack, SwitchContext, Task, TaskTable};
use super::wait_queue::WaitQueue;
use crate::arch::x86_64::fpu::{restore_floating, save_floating};
use crate::arch::x86_64::resume::build_clone_stack;
use crate::halt::FatalHalt;

/// Timer ticks a task may run before the tick handler asks for preemption.
pub const SCHED_TIME_SLICE_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every task slot is occupied.
    TableFull,
    /// No memory for a kernel stack.
    OutOfMemory,
    Frozen,
    /// No scheduler has been installed yet.
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    Frozen,
    InvalidCpu,
    CpuAlreadyInitialized,
    CpuNotInitialized,
    NoCurrentTask,
    NoSuchTask,
    NotZombie,
    /// The task's registers are still live on some core.
    StillOnCpu,
    InvalidTransition,
    Spawn(SpawnError),
}

impl From<SpawnError> for SchedError {
    fn from(e: SpawnError) -> Self {
        SchedError::Spawn(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepError {
    /// The caller is already parked on a wait queue.
    AlreadyQueued,
    /// No task is running on this core (early boot).
    NoCurrentTask,
    Frozen,
}

// =============================================================================
// Run queue
// =============================================================================

/// Insertion-ordered READY list.
struct RunQueue {
    ids: [TaskId; MAX_TASKS],
    len: usize,
}

impl RunQueue {
    const fn new() -> Self {
        Self {
            ids: [TaskId::INVALID; MAX_TASKS],
            len: 0,
        }
    }

    fn push(&mut self, id: TaskId) -> bool {
        if self.len == MAX_TASKS || self.contains(id) {
            return false;
        }
        self.ids[self.len] = id;
        self.len += 1;
        true
    }

    fn contains(&self, id: TaskId) -> bool {
        self.ids[..self.len].contains(&id)
    }

    fn take_at(&mut self, pos: usize) -> TaskId {
        let id = self.ids[pos];
        self.ids.copy_within(pos + 1..self.len, pos);
        self.len -= 1;
        id
    }

    /// Remove and return the first id accepted by `eligible`.
    fn take_first(&mut self, eligible: impl Fn(TaskId) -> bool) -> Option<TaskId> {
        let pos = self.ids[..self.len].iter().position(|&id| eligible(id))?;
        Some(self.take_at(pos))
    }

    fn any(&self, pred: impl Fn(TaskId) -> bool) -> bool {
        self.ids[..self.len].iter().any(|&id| pred(id))
    }

    fn as_slice(&self) -> &[TaskId] {
        &self.ids[..self.len]
    }
}

/// Interrupts off for the guard's lifetime; the entry state comes back on
/// drop.  Held across a switch so the lock guard's own restore cannot
/// re-enable them between the decision and the register swap.
struct IrqOff(u64);

impl IrqOff {
    #[inline]
    fn new() -> Self {
        Self(cpu::save_flags_cli())
    }
}

impl Drop for IrqOff {
    #[inline]
    fn drop(&mut self) {
        cpu::restore_flags(self.0);
    }
}

// =============================================================================
// Scheduler state
// =============================================================================

#[derive(Clone, Copy)]
struct CpuSched {
    current: Option<TaskId>,
    idle: Option<TaskId>,
    /// Task switched away from, awaiting `finish_switch`.
    prev: Option<TaskId>,
}

impl CpuSched {
    const fn new() -> Self {
        Self {
            current: None,
            idle: None,
            prev: None,
        }
    }
}

struct SchedState {
    tasks: TaskTable,
    run_queue: RunQueue,
    cpus: [CpuSched; MAX_CPUS],
}

impl SchedState {
    const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            run_queue: RunQueue::new(),
            cpus: [CpuSched::new(); MAX_CPUS],
        }
    }

    fn runnable_on(&self, cpu: usize, id: TaskId) -> bool {
        self.tasks
            .get(id)
            .is_some_and(|t| t.state == TaskState::Ready && t.on_cpu.is_none_or(|c| c == cpu))
    }

    fn has_runnable(&self, cpu: usize) -> bool {
        self.run_queue.any(|id| self.runnable_on(cpu, id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedStatsSnapshot {
    pub switches: u64,
    pub yields: u64,
    pub preemptions: u64,
    pub ticks: u64,
}

#[derive(Default)]
struct SchedStats {
    switches: AtomicU64,
    yields: AtomicU64,
    preemptions: AtomicU64,
    ticks: AtomicU64,
}

impl SchedStats {
    const fn new() -> Self {
        Self {
            switches: AtomicU64::new(0),
            yields: AtomicU64::new(0),
            preemptions: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
        }
    }
}

pub struct Scheduler<'a> {
    state: IrqMutex<SchedState>,
    switcher: &'a dyn ContextSwitch,
    halt: &'a FatalHalt,
    cores: &'a CoreTable,
    cpu_id: fn() -> usize,
    stats: SchedStats,
}

impl<'a> Scheduler<'a> {
    pub const fn new(
        switcher: &'a dyn ContextSwitch,
        halt: &'a FatalHalt,
        cores: &'a CoreTable,
        cpu_id: fn() -> usize,
    ) -> Self {
        Self {
            state: IrqMutex::new(SchedState::new()),
            switcher,
            halt,
            cores,
            cpu_id,
            stats: SchedStats::new(),
        }
    }

    #[inline]
    pub fn this_cpu(&self) -> usize {
        (self.cpu_id)()
    }

    #[inline]
    pub fn halt(&self) -> &FatalHalt {
        self.halt
    }

    #[inline]
    pub fn cores(&self) -> &CoreTable {
        self.cores
    }

    /// Adopt the calling context as `cpu`'s idle task.  The idle task runs
    /// only when nothing is READY and is never placed on the run queue.
    pub fn init_cpu(&self, cpu: usize) -> Result<TaskId, SchedError> {
        if cpu >= MAX_CPUS {
            return Err(SchedError::InvalidCpu);
        }
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return Err(SchedError::Frozen);
        }
        if st.cpus[cpu].idle.is_some() {
            return Err(SchedError::CpuAlreadyInitialized);
        }
        let id = st
            .tasks
            .insert(|id| Task::new(id, TaskKind::Idle, "idle", None))?;
        if let Some(task) = st.tasks.get_mut(id) {
            task.state = TaskState::Running;
            task.on_cpu = Some(cpu);
        }
        st.cpus[cpu] = CpuSched {
            current: Some(id),
            idle: Some(id),
            prev: None,
        };
        drop(st);
        if let Some(core) = self.cores.get(cpu) {
            core.set_current_task(Some(id));
        }
        klog_debug!("sched: cpu {} idle task {}", cpu, id);
        Ok(id)
    }

    /// Create a kernel-only task whose first resume runs `entry(cx, arg)`.
    pub fn spawn_worker_thread(
        &self,
        entry: WorkerEntry,
        name: &str,
        arg: usize,
    ) -> Result<TaskId, SpawnError> {
        let mut stack = KernelStack::allocate()?;
        let top = stack.top();
        let words = stack.words_mut();
        let last = words.len() - 1;
        words[last] = worker_entry_address();
        let ctx = SwitchContext::first_resume(
            top - 8,
            worker_entry_address(),
            entry as usize as u64,
            arg as u64,
        );
        self.admit(TaskKind::KernelWorker, name, stack, ctx)
    }

    /// Create a user task that returns from fork/clone straight into user
    /// mode with `frame` (return register zeroed).
    pub fn spawn_user_clone(&self, frame: &TrapFrame, name: &str) -> Result<TaskId, SpawnError> {
        let mut child = *frame;
        child.rax = 0;
        let mut stack = KernelStack::allocate()?;
        let base = stack.base();
        let rsp_index = build_clone_stack(stack.words_mut(), &child, user_clone_entry_address());
        let rsp = base + (rsp_index * 8) as u64;
        let ctx = SwitchContext::first_resume(rsp, user_clone_entry_address(), 0, 0);
        self.admit(TaskKind::User, name, stack, ctx)
    }

    fn admit(
        &self,
        kind: TaskKind,
        name: &str,
        stack: KernelStack,
        ctx: SwitchContext,
    ) -> Result<TaskId, SpawnError> {
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return Err(SpawnError::Frozen);
        }
        let id = st.tasks.insert(|id| {
            let mut task = Task::new(id, kind, name, Some(stack));
            task.ctx = ctx;
            task
        });
        let id = match id {
            Ok(id) => id,
            Err(e) => {
                klog_warn!("sched: cannot spawn '{}': {:?}", name, e);
                return Err(e);
            }
        };
        st.run_queue.push(id);
        klog_debug!("sched: spawned {} '{}'", id, name);
        Ok(id)
    }

    /// Hand the core to the next READY task, if there is one.  The caller
    /// is requeued behind it.  Returns whether a switch happened.
    pub fn schedule(&self) -> Result<bool, SchedError> {
        self.requeue_and_switch(self.this_cpu())
    }

    /// Cooperative yield point.  Returns immediately unless `reschedule` is
    /// set and another task is runnable on this core.
    pub fn yield_or_block(&self, reschedule: bool) {
        if !reschedule {
            return;
        }
        if let Ok(true) = self.requeue_and_switch(self.this_cpu()) {
            self.stats.yields.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Park the running task on `queue` and switch away.  Queue membership
    /// and the SLEEPING state are published under the scheduler lock, so a
    /// wakeup either happens before (and is lost) or finds the task queued.
    pub fn sleep_on(&self, queue: &WaitQueue) -> Result<(), SleepError> {
        let cpu = self.this_cpu();
        let _irq = IrqOff::new();
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return Err(SleepError::Frozen);
        }
        let cur = st.cpus.get(cpu).and_then(|c| c.current).ok_or(SleepError::NoCurrentTask)?;
        let task = st.tasks.get_mut(cur).ok_or(SleepError::NoCurrentTask)?;
        if task.is_idle() {
            return Err(SleepError::NoCurrentTask);
        }
        if task.wait_queue.is_some() {
            klog_warn!("sched: task {} already waiting on a queue", cur);
            return Err(SleepError::AlreadyQueued);
        }
        if !queue.enqueue(cur) {
            return Err(SleepError::AlreadyQueued);
        }
        task.wait_queue = Some(queue.key());
        task.state = TaskState::Sleeping;

        let plan = self.plan_switch(&mut st, cpu, cur);
        drop(st);
        if let Some(req) = plan {
            self.run_switch(&req);
        }
        Ok(())
    }

    /// Move every task parked on `queue` to READY and empty it.  Never
    /// blocks; safe from interrupt context.  Returns the number woken.
    pub fn wakeup_queue(&self, queue: &WaitQueue) -> usize {
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return 0;
        }
        let woken = queue.drain();
        let mut count = 0;
        for &id in woken.as_slice() {
            let Some(task) = st.tasks.get_mut(id) else {
                continue;
            };
            task.wait_queue = None;
            if task.transition(TaskState::Ready) {
                st.run_queue.push(id);
                count += 1;
            }
        }
        count
    }

    /// Retire the running task: RUNNING → ZOMBIE, then switch away for good.
    pub fn exit_current(&self, code: i32) -> ! {
        let cpu = self.this_cpu();
        let _irq = IrqOff::new();
        match self.mark_exited(cpu, code) {
            Ok(Some(req)) => {
                self.run_switch(&req);
                crate::halt::fatal_with_message("sched: zombie task resumed")
            }
            Ok(None) => crate::halt::fatal_with_message("sched: exiting task had nowhere to go"),
            Err(e) => {
                klog_warn!("sched: exit_current rejected: {:?}", e);
                crate::halt::fatal_with_message("sched: exit outside a task")
            }
        }
    }

    pub(crate) fn mark_exited(&self, cpu: usize, code: i32) -> Result<Option<SwitchRequest>, SchedError> {
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return Err(SchedError::Frozen);
        }
        let cur = st.cpus.get(cpu).and_then(|c| c.current).ok_or(SchedError::NoCurrentTask)?;
        let task = st.tasks.get_mut(cur).ok_or(SchedError::NoCurrentTask)?;
        if task.is_idle() || !task.transition(TaskState::Zombie) {
            return Err(SchedError::InvalidTransition);
        }
        task.exit_code = Some(code);
        klog_debug!("sched: task {} exited with {}", cur, code);
        Ok(self.plan_switch(&mut st, cpu, cur))
    }

    /// Free a ZOMBIE's slot and stack, returning its exit code.
    pub fn reap(&self, id: TaskId) -> Result<i32, SchedError> {
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return Err(SchedError::Frozen);
        }
        let task = st.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        if task.state != TaskState::Zombie {
            return Err(SchedError::NotZombie);
        }
        if task.on_cpu.is_some() {
            return Err(SchedError::StillOnCpu);
        }
        let code = task.exit_code.unwrap_or(0);
        st.tasks.remove(id);
        Ok(code)
    }

    /// Record the trap frame of the syscall the running task just entered,
    /// or clear it (`None`) on syscall exit.  The frame follows the task
    /// across switches and cores.
    pub fn set_syscall_frame(&self, frame: Option<*mut TrapFrame>) -> Result<(), SchedError> {
        let cpu = self.this_cpu();
        let mut st = self.state.lock();
        let cur = st.cpus.get(cpu).and_then(|c| c.current).ok_or(SchedError::NoCurrentTask)?;
        let task = st.tasks.get_mut(cur).ok_or(SchedError::NoCurrentTask)?;
        if task.is_idle() {
            return Err(SchedError::NoCurrentTask);
        }
        task.syscall_frame = frame.map(|p| p as usize);
        Ok(())
    }

    /// In-flight syscall frame of the task running on this core.
    pub fn syscall_frame(&self) -> Option<*mut TrapFrame> {
        let cpu = self.this_cpu();
        let st = self.state.lock();
        let cur = st.cpus.get(cpu).and_then(|c| c.current)?;
        st.tasks
            .get(cur)
            .and_then(|t| t.syscall_frame)
            .map(|addr| addr as *mut TrapFrame)
    }

    /// Timer interrupt bookkeeping for `cpu`.
    pub fn timer_tick(&self, cpu: usize) {
        let mut st = self.state.lock();
        if self.halt.is_frozen() || cpu >= MAX_CPUS {
            return;
        }
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let Some(cur) = st.cpus[cpu].current else {
            return;
        };
        let others = st.has_runnable(cpu);
        let Some(task) = st.tasks.get_mut(cur) else {
            return;
        };
        let expired = if task.is_idle() {
            true
        } else {
            task.slice_left = task.slice_left.saturating_sub(1);
            task.slice_left == 0
        };
        if expired && others {
            if let Some(core) = self.cores.get(cpu) {
                core.set_reschedule_pending();
            }
        }
    }

    /// Interrupt-exit preemption point: switch away if the tick handler
    /// asked for it.  Returns whether a switch happened.
    pub fn preempt(&self, cpu: usize) -> bool {
        let Some(core) = self.cores.get(cpu) else {
            return false;
        };
        if !core.take_reschedule_pending() {
            return false;
        }
        match self.requeue_and_switch(cpu) {
            Ok(true) => {
                self.stats.preemptions.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// Runs on the resumed side of every switch: releases the previous
    /// task's registers so other cores may pick it.
    pub fn finish_switch(&self, cpu: usize) {
        let mut st = self.state.lock();
        let Some(cs) = st.cpus.get_mut(cpu) else {
            return;
        };
        let Some(prev) = cs.prev.take() else {
            return;
        };
        let current = cs.current;
        if current == Some(prev) {
            return;
        }
        if let Some(task) = st.tasks.get_mut(prev) {
            if task.on_cpu == Some(cpu) {
                task.on_cpu = None;
            }
        }
    }

    /// Shared by schedule, yield and preempt: if something else can run
    /// here, requeue the current task (idle is never queued) and switch.
    fn requeue_and_switch(&self, cpu: usize) -> Result<bool, SchedError> {
        if cpu >= MAX_CPUS {
            return Err(SchedError::InvalidCpu);
        }
        let _irq = IrqOff::new();
        let mut st = self.state.lock();
        if self.halt.is_frozen() {
            return Err(SchedError::Frozen);
        }
        if st.cpus[cpu].idle.is_none() {
            return Err(SchedError::CpuNotInitialized);
        }
        let cur = st.cpus[cpu].current.ok_or(SchedError::NoCurrentTask)?;
        if !st.has_runnable(cpu) {
            return Ok(false);
        }
        let task = st.tasks.get_mut(cur).ok_or(SchedError::NoCurrentTask)?;
        if !task.is_idle() {
            if !task.transition(TaskState::Ready) {
                return Err(SchedError::InvalidTransition);
            }
            st.run_queue.push(cur);
        }
        let plan = self.plan_switch(&mut st, cpu, cur);
        drop(st);
        match plan {
            Some(req) => {
                self.run_switch(&req);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pick the next task for `cpu` and commit the bookkeeping.  `cur` has
    /// already been moved to its departure state (READY and requeued,
    /// SLEEPING, or ZOMBIE).
    fn plan_switch(&self, st: &mut SchedState, cpu: usize, cur: TaskId) -> Option<SwitchRequest> {
        st.tasks.get(cur)?;
        let next = st
            .run_queue
            .take_first(|id| {
                st.tasks
                    .get(id)
                    .is_some_and(|t| t.state == TaskState::Ready && t.on_cpu.is_none_or(|c| c == cpu))
            })
            .or(st.cpus[cpu].idle)?;

        if next == cur {
            if let Some(task) = st.tasks.get_mut(cur) {
                task.state = TaskState::Running;
                task.slice_left = SCHED_TIME_SLICE_TICKS;
            }
            return None;
        }

        let prev_ctx = {
            let prev = st.tasks.get_mut(cur)?;
            if prev.is_idle() {
                prev.state = TaskState::Ready;
            }
            save_floating(prev);
            &mut prev.ctx as *mut SwitchContext
        };
        let next_ctx = {
            let task = st.tasks.get_mut(next)?;
            task.state = TaskState::Running;
            task.on_cpu = Some(cpu);
            task.slice_left = SCHED_TIME_SLICE_TICKS;
            restore_floating(task);
            &task.ctx as *const SwitchContext
        };
        st.cpus[cpu].current = Some(next);
        st.cpus[cpu].prev = Some(cur);
        if let Some(core) = self.cores.get(cpu) {
            core.set_current_task(Some(next));
        }
        self.stats.switches.fetch_add(1, Ordering::Relaxed);
        Some(SwitchRequest {
            cpu,
            prev: cur,
            next,
            prev_ctx,
            next_ctx,
        })
    }

    /// Callers hold an [`IrqOff`] across this call.
    fn run_switch(&self, req: &SwitchRequest) {
        // SAFETY: both contexts live in task slots that cannot be reaped
        // while `on_cpu` is set.
        unsafe { self.switcher.switch(req) };
        self.finish_switch(self.this_cpu());
    }

    /// Put `id` back on `cpu` without touching its queue membership.
    #[cfg(test)]
    pub(crate) fn force_current(&self, cpu: usize, id: TaskId) {
        let mut st = self.state.lock();
        if let Some(task) = st.tasks.get_mut(id) {
            task.state = TaskState::Running;
            task.on_cpu = Some(cpu);
        }
        st.cpus[cpu].current = Some(id);
    }

    #[cfg(test)]
    pub(crate) fn set_on_cpu(&self, id: TaskId, cpu: Option<usize>) {
        if let Some(task) = self.state.lock().tasks.get_mut(id) {
            task.on_cpu = cpu;
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn current(&self, cpu: usize) -> Option<TaskId> {
        self.state.lock().cpus.get(cpu).and_then(|c| c.current)
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.state.lock().tasks.get(id).map(|t| t.state)
    }

    pub fn task_wait_queue(&self, id: TaskId) -> Option<usize> {
        self.state.lock().tasks.get(id).and_then(|t| t.wait_queue)
    }

    pub fn task_on_cpu(&self, id: TaskId) -> Option<usize> {
        self.state.lock().tasks.get(id).and_then(|t| t.on_cpu)
    }

    pub fn with_task<R>(&self, id: TaskId, f: impl FnOnce(&Task) -> R) -> Option<R> {
        self.state.lock().tasks.get(id).map(f)
    }

    /// READY tasks in run-queue order.
    pub fn ready_tasks(&self, out: &mut [TaskId]) -> usize {
        let st = self.state.lock();
        let ids = st.run_queue.as_slice();
        let n = ids.len().min(out.len());
        out[..n].copy_from_slice(&ids[..n]);
        n
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn stats(&self) -> SchedStatsSnapshot {
        SchedStatsSnapshot {
            switches: self.stats.switches.load(Ordering::Relaxed),
            yields: self.stats.yields.load(Ordering::Relaxed),
            preemptions: self.stats.preemptions.load(Ordering::Relaxed),
            ticks: self.stats.ticks.load(Ordering::Relaxed),
        }
    }

    /// Idle body for the calling core.
    pub fn idle_loop(&self) -> ! {
        loop {
            crate::arch::x86_64::pause();
            let _ = self.schedule();
        }
    }

    /// Task-context capability for the code that is running right now.
    /// Only for entry paths that are known to run in task context
    /// (syscall dispatch, worker start).
    pub fn task_cx(&self) -> TaskCx<'_> {
        TaskCx::new(self)
    }
}

// =============================================================================
// Global instance
// =============================================================================

static SCHEDULER: spin::Once<Scheduler<'static>> = spin::Once::new();

/// Install the machine scheduler.  Later calls return the first instance.
pub fn init_scheduler(switcher: &'static dyn ContextSwitch) -> &'static Scheduler<'static> {
    SCHEDULER.call_once(|| {
        klog_info!("sched: initialized ({} task slots)", MAX_TASKS);
        Scheduler::new(
            switcher,
            &crate::halt::FATAL,
            &kestrel_lib::pcr::CORES,
            kestrel_lib::current_cpu,
        )
    })
}

pub fn scheduler() -> Option<&'static Scheduler<'static>> {
    SCHEDULER.get()
}

pub fn spawn_worker_thread(entry: WorkerEntry, name: &str, arg: usize) -> Result<TaskId, SpawnError> {
    match scheduler() {
        Some(s) => s.spawn_worker_thread(entry, name, arg),
        None => Err(SpawnError::NotReady),
    }
}

pub fn schedule() {
    if let Some(s) = scheduler() {
        let _ = s.schedule();
    }
}

/// First code a new worker runs, reached from the entry trampoline.
#[cfg(target_os = "none")]
pub(crate) extern "sysv64" fn worker_main(entry: usize, arg: usize) -> ! {
    let Some(sched) = scheduler() else {
        crate::halt::fatal_with_message("sched: worker started without a scheduler")
    };
    sched.finish_switch(sched.this_cpu());
    // First resume arrives with interrupts off; see `RFlags::KERNEL_TASK`.
    kestrel_lib::cpu::enable_interrupts();
    // SAFETY: `spawn_worker_thread` stored a `WorkerEntry` in r12.
    let entry: WorkerEntry = unsafe { core::mem::transmute::<usize, WorkerEntry>(entry) };
    entry(&sched.task_cx(), arg);
    sched.exit_current(0)
}

#[cfg(target_os = "none")]
pub(crate) extern "sysv64" fn finish_switch_here() {
    if let Some(sched) = scheduler() {
        sched.finish_switch(sched.this_cpu());
    }
}
