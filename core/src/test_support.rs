//! Host-side fixtures: recording mocks for the hardware seams and a
//! scheduler fixture with setup in `new()` and teardown in `Drop`.

use std::cell::Cell;
use std::sync::Mutex;

use kestrel_abi::arch::IcrCommand;
use kestrel_abi::task::TaskId;
use kestrel_lib::pcr::CoreTable;

use crate::halt::{FatalHalt, IpiSender};
use crate::irq::{InterruptController, InterruptRouter};
use crate::scheduler::context::TaskCx;
use crate::scheduler::scheduler::Scheduler;
use crate::scheduler::switch::{ContextSwitch, SwitchRequest};
use crate::scheduler::wait_queue::WaitQueue;

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

thread_local! {
    static TEST_CPU: Cell<usize> = const { Cell::new(0) };
}

/// Core index reported to schedulers built by the fixture.
pub fn test_cpu() -> usize {
    TEST_CPU.with(Cell::get)
}

pub fn set_test_cpu(cpu: usize) {
    TEST_CPU.with(|c| c.set(cpu));
}

type SwitchHook = Box<dyn Fn(&SwitchRequest) + Send>;

/// Records every switch and returns immediately, as if the previous task
/// had been resumed straight away.
#[derive(Default)]
pub struct RecordingSwitch {
    log: Mutex<Vec<(TaskId, TaskId)>>,
    hook: Mutex<Option<SwitchHook>>,
}

impl RecordingSwitch {
    pub fn switches(&self) -> Vec<(TaskId, TaskId)> {
        self.log.lock().unwrap().clone()
    }

    /// Run `hook` in the window between the scheduler releasing its lock
    /// and the registers changing hands.
    pub fn set_hook(&self, hook: impl Fn(&SwitchRequest) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn clear_hook(&self) {
        *self.hook.lock().unwrap() = None;
    }
}

impl ContextSwitch for RecordingSwitch {
    unsafe fn switch(&self, req: &SwitchRequest) {
        self.log.lock().unwrap().push((req.prev, req.next));
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook(req);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerOp {
    Eoi(u8),
    Mask(u8),
    Unmask(u8),
}

#[derive(Default)]
pub struct MockController {
    ops: Mutex<Vec<ControllerOp>>,
}

impl MockController {
    pub fn ops(&self) -> Vec<ControllerOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn eoi_count(&self, line: u8) -> usize {
        self.ops()
            .iter()
            .filter(|op| **op == ControllerOp::Eoi(line))
            .count()
    }
}

impl InterruptController for MockController {
    fn eoi(&self, line: u8) {
        self.ops.lock().unwrap().push(ControllerOp::Eoi(line));
    }
    fn mask(&self, line: u8) {
        self.ops.lock().unwrap().push(ControllerOp::Mask(line));
    }
    fn unmask(&self, line: u8) {
        self.ops.lock().unwrap().push(ControllerOp::Unmask(line));
    }
}

/// Delivers the stop IPI by parking the simulated target core.
pub struct SimulatedIpi {
    pub sent: Mutex<Vec<(u32, IcrCommand)>>,
    pub cores: &'static CoreTable,
    pub halt: &'static FatalHalt,
}

impl IpiSender for SimulatedIpi {
    fn send_ipi(&self, lapic_id: u32, command: IcrCommand) {
        self.sent.lock().unwrap().push((lapic_id, command));
        if let Some(core) = self.cores.online().find(|c| c.lapic_id() == lapic_id) {
            self.halt.park(Some(core), false);
        }
    }
}

pub fn noop_worker(_cx: &TaskCx<'_>, _arg: usize) {}

/// Scheduler on simulated core 0 with its idle task installed.
pub struct SchedFixture {
    pub sched: &'static Scheduler<'static>,
    pub switch: &'static RecordingSwitch,
    pub halt: &'static FatalHalt,
    pub cores: &'static CoreTable,
    pub controller: &'static MockController,
    pub router: &'static InterruptRouter<'static>,
    pub idle: TaskId,
}

impl SchedFixture {
    pub fn new() -> Self {
        set_test_cpu(0);
        let switch = leak(RecordingSwitch::default());
        let halt = leak(FatalHalt::new());
        let cores = leak(CoreTable::new());
        cores.bring_online(0, 0);
        let sched = leak(Scheduler::new(switch, halt, cores, test_cpu));
        let idle = sched.init_cpu(0).expect("idle task for cpu 0");
        let controller = leak(MockController::default());
        let router = leak(InterruptRouter::new(controller, sched));
        Self {
            sched,
            switch,
            halt,
            cores,
            controller,
            router,
            idle,
        }
    }

    pub fn spawn(&self, name: &str) -> TaskId {
        self.sched
            .spawn_worker_thread(noop_worker, name, 0)
            .expect("spawn worker")
    }

    pub fn cx(&self) -> TaskCx<'static> {
        self.sched.task_cx()
    }

    pub fn current(&self) -> Option<TaskId> {
        self.sched.current(test_cpu())
    }

    pub fn queue(&self, name: &'static str) -> &'static WaitQueue {
        leak(WaitQueue::new(name))
    }

    pub fn ready(&self) -> Vec<TaskId> {
        let mut buf = [TaskId::INVALID; kestrel_abi::task::MAX_TASKS];
        let n = self.sched.ready_tasks(&mut buf);
        buf[..n].to_vec()
    }
}

impl Drop for SchedFixture {
    fn drop(&mut self) {
        self.switch.clear_hook();
        set_test_cpu(0);
    }
}
