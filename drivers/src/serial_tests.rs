use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use kestrel_abi::arch::IRQ_BASE_VECTOR;
use kestrel_abi::task::TaskState;
use kestrel_core::irq::{Dispatch, InterruptController, InterruptRouter};
use kestrel_core::scheduler::{ContextSwitch, SwitchRequest};
use kestrel_core::{FatalHalt, Scheduler, TaskCx};
use kestrel_lib::kdiag::TrapFrame;
use kestrel_lib::pcr::CoreTable;
use kestrel_lib::{PortIo, ports::COM1, ports::COM2, ports::COM3, ports::COM4};

use crate::devfs::{DIALOUT_GID, DevError, DeviceMode, DeviceNamespace, DeviceNode, TtyEndpoint, TtyOutput};
use crate::serial::{SERIAL_IRQ_AC, SERIAL_IRQ_BD, SerialDriver, SerialError};

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

#[derive(Default)]
struct UartState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    lcr: u8,
    thr_busy_polls: u32,
    writes: Vec<(u16, u8)>,
}

/// Four 16550s behind one port space.
#[derive(Default)]
struct FakeUarts {
    ports: Mutex<HashMap<u16, UartState>>,
}

impl FakeUarts {
    fn with<R>(&self, base: u16, f: impl FnOnce(&mut UartState) -> R) -> R {
        f(self.ports.lock().unwrap().entry(base).or_default())
    }

    fn receive(&self, base: u16, bytes: &[u8]) {
        self.with(base, |u| u.rx.extend(bytes.iter().copied()));
    }
}

impl PortIo for FakeUarts {
    fn inb(&self, port: u16) -> u8 {
        self.with(port & !7, |u| match port & 7 {
            0 => u.rx.pop_front().unwrap_or(0),
            5 => {
                let mut lsr = 0;
                if !u.rx.is_empty() {
                    lsr |= 0x01;
                }
                if u.thr_busy_polls > 0 {
                    u.thr_busy_polls -= 1;
                } else {
                    lsr |= 0x20;
                }
                lsr
            }
            _ => 0,
        })
    }

    fn outb(&self, port: u16, value: u8) {
        self.with(port & !7, |u| {
            u.writes.push((port & 7, value));
            match port & 7 {
                0 if u.lcr & 0x80 == 0 => u.tx.push(value),
                3 => u.lcr = value,
                _ => {}
            }
        });
    }
}

#[derive(Default)]
struct RecordingTty {
    bytes: Mutex<Vec<u8>>,
}

impl TtyEndpoint for RecordingTty {
    fn input(&self, byte: u8) {
        self.bytes.lock().unwrap().push(byte);
    }
}

#[derive(Default)]
struct FakeDevfs {
    mounted: Mutex<Vec<(DeviceNode, &'static RecordingTty, &'static dyn TtyOutput)>>,
    refuse: Option<&'static str>,
}

impl FakeDevfs {
    fn tty(&self, path: &str) -> &'static RecordingTty {
        let mounted = self.mounted.lock().unwrap();
        mounted
            .iter()
            .find(|(n, _, _)| n.path == path)
            .map(|(_, t, _)| *t)
            .expect("mounted tty")
    }

    fn output(&self, path: &str) -> &'static dyn TtyOutput {
        let mounted = self.mounted.lock().unwrap();
        mounted
            .iter()
            .find(|(n, _, _)| n.path == path)
            .map(|(_, _, o)| *o)
            .expect("mounted tty")
    }
}

impl DeviceNamespace for FakeDevfs {
    fn attach_tty(
        &self,
        node: &DeviceNode,
        output: &'static dyn TtyOutput,
    ) -> Result<&'static dyn TtyEndpoint, DevError> {
        if self.refuse == Some(node.path) {
            return Err(DevError::PathInUse);
        }
        let tty = leak(RecordingTty::default());
        self.mounted.lock().unwrap().push((*node, tty, output));
        Ok(tty)
    }
}

#[derive(Default)]
struct NullSwitch;

impl ContextSwitch for NullSwitch {
    unsafe fn switch(&self, _req: &SwitchRequest) {}
}

#[derive(Default)]
struct RecordingController {
    eoi: Mutex<Vec<u8>>,
    unmasked: Mutex<Vec<u8>>,
}

impl InterruptController for RecordingController {
    fn eoi(&self, line: u8) {
        self.eoi.lock().unwrap().push(line);
    }
    fn mask(&self, _line: u8) {}
    fn unmask(&self, line: u8) {
        self.unmasked.lock().unwrap().push(line);
    }
}

/// A scheduler, router and serial driver over fake hardware, with the
/// line workers spawned and the terminals mounted.
struct SerialFixture {
    uarts: &'static FakeUarts,
    sched: &'static Scheduler<'static>,
    controller: &'static RecordingController,
    router: &'static InterruptRouter<'static>,
    devfs: &'static FakeDevfs,
    driver: &'static SerialDriver,
}

impl SerialFixture {
    fn new() -> Self {
        Self::build(FakeDevfs::default()).expect("serial init")
    }

    fn build(devfs: FakeDevfs) -> Result<Self, SerialError> {
        let uarts = leak(FakeUarts::default());
        let cores = leak(CoreTable::new());
        cores.bring_online(0, 0);
        let sched = leak(Scheduler::new(leak(NullSwitch), leak(FatalHalt::new()), cores, || 0));
        sched.init_cpu(0).expect("idle");
        let controller = leak(RecordingController::default());
        let router = leak(InterruptRouter::new(controller, sched));
        let devfs = leak(devfs);
        let driver = leak(SerialDriver::new(uarts));
        driver.initialize(sched, router, devfs)?;
        Ok(Self {
            uarts,
            sched,
            controller,
            router,
            devfs,
            driver,
        })
    }

    fn cx(&self) -> TaskCx<'static> {
        self.sched.task_cx()
    }

    /// Rotate until the given line's worker is running on the core.
    fn run_worker(&self, line: usize) {
        let want = ["[serial ac]", "[serial bd]"][line];
        let running = || {
            self.sched
                .current(0)
                .and_then(|id| self.sched.with_task(id, |t| t.name() == want))
                .unwrap_or(false)
        };
        while !running() {
            assert_eq!(self.sched.schedule(), Ok(true));
        }
    }
}

const INIT_SEQUENCE: [(u16, u8); 8] = [
    (1, 0x00),
    (3, 0x80),
    (0, 0x01),
    (1, 0x00),
    (3, 0x03),
    (2, 0xC7),
    (4, 0x0B),
    (1, 0x01),
];

#[test]
fn initialize_spawns_workers_and_mounts_four_terminals() {
    let fx = SerialFixture::new();

    let mut ready = [kestrel_abi::task::TaskId::INVALID; 4];
    let n = fx.sched.ready_tasks(&mut ready);
    let names: Vec<String> = ready[..n]
        .iter()
        .filter_map(|&id| fx.sched.with_task(id, |t| t.name().to_owned()))
        .collect();
    assert_eq!(names, ["[serial ac]", "[serial bd]"]);

    let mounted = fx.devfs.mounted.lock().unwrap();
    let paths: Vec<&str> = mounted.iter().map(|(n, _, _)| n.path).collect();
    assert_eq!(paths, ["/dev/ttyS0", "/dev/ttyS1", "/dev/ttyS2", "/dev/ttyS3"]);
    for (node, _, _) in mounted.iter() {
        assert_eq!(node.gid, DIALOUT_GID);
        assert_eq!(node.mode, DeviceMode::TTY);
        assert_eq!(node.mode.bits(), 0o660);
    }
    drop(mounted);

    for base in [COM1, COM2, COM3, COM4] {
        let writes = fx.uarts.with(base, |u| u.writes.clone());
        assert_eq!(writes, INIT_SEQUENCE, "port {:#x}", base);
    }

    assert_eq!(*fx.controller.unmasked.lock().unwrap(), [SERIAL_IRQ_AC, SERIAL_IRQ_BD]);
    for line in [SERIAL_IRQ_AC, SERIAL_IRQ_BD] {
        assert!(fx.router.stats(line).is_some_and(|s| s.installed));
    }
}

#[test]
fn mount_failure_is_reported() {
    let devfs = FakeDevfs {
        refuse: Some("/dev/ttyS1"),
        ..FakeDevfs::default()
    };
    assert!(matches!(
        SerialFixture::build(devfs),
        Err(SerialError::Device(DevError::PathInUse))
    ));
}

#[test]
fn interrupt_wakes_the_line_worker() {
    let fx = SerialFixture::new();
    fx.run_worker(0);
    let worker = fx.sched.current(0).expect("worker");
    let line = &fx.driver.lines()[0];

    fx.cx().sleep_on(line.queue()).expect("sleep");
    assert_eq!(fx.sched.task_state(worker), Some(TaskState::Sleeping));

    let mut frame = TrapFrame::zeroed();
    frame.int_no = (IRQ_BASE_VECTOR + SERIAL_IRQ_AC) as u64;
    assert_eq!(fx.router.dispatch(&frame), Dispatch::Handled);

    assert_eq!(fx.sched.task_state(worker), Some(TaskState::Ready));
    assert!(line.queue().is_empty());
    assert_eq!(*fx.controller.eoi.lock().unwrap(), [SERIAL_IRQ_AC]);
}

#[test]
fn worker_finds_the_port_with_data() {
    let fx = SerialFixture::new();
    fx.run_worker(0);
    fx.uarts.receive(COM3, b"hi");

    let line = &fx.driver.lines()[0];
    assert_eq!(line.pending_port().map(|p| p.base()), Some(COM3));
    assert_eq!(line.drain(&fx.cx()), 2);

    assert_eq!(*fx.devfs.tty("/dev/ttyS2").bytes.lock().unwrap(), b"hi");
    assert!(fx.devfs.tty("/dev/ttyS0").bytes.lock().unwrap().is_empty());
    assert!(line.pending_port().is_none());
}

#[test]
fn shared_line_drains_both_ports() {
    let fx = SerialFixture::new();
    fx.run_worker(1);
    fx.uarts.receive(COM2, b"ab");
    fx.uarts.receive(COM4, b"z");

    assert_eq!(fx.driver.lines()[1].drain(&fx.cx()), 3);
    assert_eq!(*fx.devfs.tty("/dev/ttyS1").bytes.lock().unwrap(), b"ab");
    assert_eq!(*fx.devfs.tty("/dev/ttyS3").bytes.lock().unwrap(), b"z");
}

#[test]
fn drain_yields_between_bytes() {
    let fx = SerialFixture::new();
    fx.run_worker(0);
    fx.uarts.receive(COM1, b"xyz");

    let before = fx.sched.stats().yields;
    assert_eq!(fx.driver.lines()[0].drain(&fx.cx()), 3);
    assert_eq!(fx.sched.stats().yields - before, 2);
    assert_eq!(*fx.devfs.tty("/dev/ttyS0").bytes.lock().unwrap(), b"xyz");
}

#[test]
fn transmit_waits_for_holding_register() {
    let fx = SerialFixture::new();
    fx.run_worker(0);
    fx.uarts.with(COM1, |u| u.thr_busy_polls = 2);

    let before = fx.sched.stats().yields;
    fx.devfs.output("/dev/ttyS0").write_out(&fx.cx(), b'!');
    assert_eq!(fx.uarts.with(COM1, |u| u.tx.clone()), b"!");
    assert_eq!(fx.uarts.with(COM1, |u| u.thr_busy_polls), 0);
    assert_eq!(fx.sched.stats().yields - before, 2);
}

#[test]
fn port_lookup_by_base() {
    let fx = SerialFixture::new();
    assert_eq!(fx.driver.port(COM4).map(|p| p.path()), Some("/dev/ttyS3"));
    assert!(fx.driver.port(0x1234).is_none());
    assert!(fx.driver.port(COM1).and_then(|p| p.tty()).is_some());
}
