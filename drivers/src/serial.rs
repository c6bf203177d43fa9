//! 16550 serial lines attached as terminals.
//!
//! Four ports share two interrupt lines: A and C raise IRQ 4, B and D raise
//! IRQ 3.  Each line has one wait queue and one worker thread.  The IRQ
//! handler only acknowledges and wakes the queue; the worker works out
//! which port has data from its line status register, feeds the bytes to
//! the port's terminal and goes back to sleep.

use kestrel_core::irq::InterruptRouter;
use kestrel_core::{IrqCx, IrqError, Scheduler, SleepError, SpawnError, TaskCx, WaitQueue};
use kestrel_lib::ports::{
    COM1, COM2, COM3, COM4, LineStatus, UART_DIVISOR_115200, UART_FCR_INIT, UART_IER_RX_AVAILABLE,
    UART_LCR_8N1, UART_LCR_DLAB, UART_MCR_INIT, UART_REG_DLL, UART_REG_DLM, UART_REG_FCR,
    UART_REG_IER, UART_REG_LCR, UART_REG_MCR, UART_REG_RBR, UART_REG_THR, line_status,
};
use kestrel_lib::{InitFlag, PortIo, klog_debug, klog_info, klog_warn};

use crate::devfs::{
    DIALOUT_GID, DevError, DeviceMode, DeviceNamespace, DeviceNode, TtyEndpoint, TtyOutput,
};

pub const SERIAL_IRQ_AC: u8 = 4;
pub const SERIAL_IRQ_BD: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    Spawn(SpawnError),
    Irq(IrqError),
    Device(DevError),
    /// Scheduler or interrupt router not installed yet.
    NotReady,
}

impl From<SpawnError> for SerialError {
    fn from(e: SpawnError) -> Self {
        SerialError::Spawn(e)
    }
}

impl From<IrqError> for SerialError {
    fn from(e: IrqError) -> Self {
        SerialError::Irq(e)
    }
}

impl From<DevError> for SerialError {
    fn from(e: DevError) -> Self {
        SerialError::Device(e)
    }
}

pub struct SerialPort {
    base: u16,
    path: &'static str,
    io: &'static dyn PortIo,
    tty: spin::Once<&'static dyn TtyEndpoint>,
}

impl SerialPort {
    pub const fn new(base: u16, path: &'static str, io: &'static dyn PortIo) -> Self {
        Self {
            base,
            path,
            io,
            tty: spin::Once::new(),
        }
    }

    #[inline]
    pub fn base(&self) -> u16 {
        self.base
    }

    #[inline]
    pub fn path(&self) -> &'static str {
        self.path
    }

    /// 115200 baud, 8N1, FIFOs on, receive interrupt enabled.
    pub fn enable(&self) {
        let io = self.io;
        let [div_lo, div_hi] = UART_DIVISOR_115200.to_le_bytes();
        io.outb(self.base + UART_REG_IER, 0x00);
        io.outb(self.base + UART_REG_LCR, UART_LCR_DLAB);
        io.outb(self.base + UART_REG_DLL, div_lo);
        io.outb(self.base + UART_REG_DLM, div_hi);
        io.outb(self.base + UART_REG_LCR, UART_LCR_8N1);
        io.outb(self.base + UART_REG_FCR, UART_FCR_INIT);
        io.outb(self.base + UART_REG_MCR, UART_MCR_INIT);
        io.outb(self.base + UART_REG_IER, UART_IER_RX_AVAILABLE);
    }

    #[inline]
    pub fn data_ready(&self) -> bool {
        line_status(self.io, self.base).contains(LineStatus::DATA_READY)
    }

    #[inline]
    pub fn transmit_empty(&self) -> bool {
        line_status(self.io, self.base).contains(LineStatus::THR_EMPTY)
    }

    /// Read one byte, yielding until the receiver has one.
    pub fn recv(&self, cx: &TaskCx<'_>) -> u8 {
        while !self.data_ready() {
            cx.yield_or_block(true);
        }
        self.io.inb(self.base + UART_REG_RBR)
    }

    /// Write one byte, yielding until the transmitter holding register is
    /// free.
    pub fn send(&self, cx: &TaskCx<'_>, byte: u8) {
        while !self.transmit_empty() {
            cx.yield_or_block(true);
        }
        self.io.outb(self.base + UART_REG_THR, byte);
    }

    pub fn tty(&self) -> Option<&'static dyn TtyEndpoint> {
        self.tty.get().copied()
    }
}

impl TtyOutput for SerialPort {
    fn write_out(&self, cx: &TaskCx<'_>, byte: u8) {
        self.send(cx, byte);
    }
}

/// One interrupt line and the ports wired to it.
pub struct SerialLine {
    irq: u8,
    name: &'static str,
    worker_name: &'static str,
    queue: WaitQueue,
    ports: [SerialPort; 2],
    handler_installed: InitFlag,
}

impl SerialLine {
    const fn new(
        irq: u8,
        name: &'static str,
        worker_name: &'static str,
        queue_name: &'static str,
        ports: [SerialPort; 2],
    ) -> Self {
        Self {
            irq,
            name,
            worker_name,
            queue: WaitQueue::new(queue_name),
            ports,
            handler_installed: InitFlag::new(),
        }
    }

    #[inline]
    pub fn irq(&self) -> u8 {
        self.irq
    }

    #[inline]
    pub fn queue(&self) -> &WaitQueue {
        &self.queue
    }

    pub fn ports(&self) -> &[SerialPort; 2] {
        &self.ports
    }

    /// First port on this line with a received byte waiting.
    pub fn pending_port(&self) -> Option<&SerialPort> {
        self.ports.iter().find(|p| p.data_ready())
    }

    /// Move every waiting byte to its terminal, yielding between bytes.
    /// Returns the number of bytes moved.
    pub fn drain(&self, cx: &TaskCx<'_>) -> usize {
        let mut moved = 0;
        while let Some(port) = self.pending_port() {
            loop {
                let byte = port.recv(cx);
                match port.tty() {
                    Some(tty) => tty.input(byte),
                    None => klog_debug!("serial: dropped byte on unattached {}", port.path),
                }
                moved += 1;
                if !port.data_ready() {
                    break;
                }
                cx.yield_or_block(true);
            }
        }
        moved
    }

    /// Block until the line interrupts, then drain it.
    pub fn service(&self, cx: &TaskCx<'_>) -> Result<usize, SleepError> {
        cx.sleep_on(&self.queue)?;
        Ok(self.drain(cx))
    }
}

/// Acknowledge and wake the line's worker.  `context` is the line.
fn serial_irq_handler(cx: &IrqCx<'_>, context: usize) {
    // SAFETY: installed by `SerialDriver::initialize` with the address of a
    // line inside a `'static` driver.
    let line = unsafe { &*(context as *const SerialLine) };
    cx.ack();
    cx.wakeup(&line.queue);
}

/// Worker body: sole consumer of one line's queue.  `arg` is the line.
fn serial_worker(cx: &TaskCx<'_>, arg: usize) {
    // SAFETY: spawned by `SerialDriver::initialize` with the address of a
    // line inside a `'static` driver.
    let line = unsafe { &*(arg as *const SerialLine) };
    loop {
        if let Err(e) = line.service(cx) {
            klog_warn!("serial: {} worker stopping: {:?}", line.name, e);
            return;
        }
    }
}

const LINE_AC: usize = 0;
const LINE_BD: usize = 1;

/// Device creation order: ttyS0..ttyS3.
const ATTACH_ORDER: [(usize, usize); 4] = [(LINE_AC, 0), (LINE_BD, 0), (LINE_AC, 1), (LINE_BD, 1)];

pub struct SerialDriver {
    lines: [SerialLine; 2],
}

impl SerialDriver {
    pub const fn new(io: &'static dyn PortIo) -> Self {
        Self {
            lines: [
                SerialLine::new(
                    SERIAL_IRQ_AC,
                    "serial ac",
                    "[serial ac]",
                    "serial ac semaphore",
                    [
                        SerialPort::new(COM1, "/dev/ttyS0", io),
                        SerialPort::new(COM3, "/dev/ttyS2", io),
                    ],
                ),
                SerialLine::new(
                    SERIAL_IRQ_BD,
                    "serial bd",
                    "[serial bd]",
                    "serial bd semaphore",
                    [
                        SerialPort::new(COM2, "/dev/ttyS1", io),
                        SerialPort::new(COM4, "/dev/ttyS3", io),
                    ],
                ),
            ],
        }
    }

    pub fn lines(&self) -> &[SerialLine; 2] {
        &self.lines
    }

    pub fn port(&self, base: u16) -> Option<&SerialPort> {
        self.lines
            .iter()
            .flat_map(|l| l.ports.iter())
            .find(|p| p.base == base)
    }

    /// Start both line workers, then create, enable and mount the four
    /// terminals.  A line's IRQ handler is installed with its first port.
    pub fn initialize(
        &'static self,
        sched: &Scheduler<'_>,
        router: &InterruptRouter<'_>,
        ns: &dyn DeviceNamespace,
    ) -> Result<(), SerialError> {
        for line in &self.lines {
            let id = sched.spawn_worker_thread(
                serial_worker,
                line.worker_name,
                line as *const SerialLine as usize,
            )?;
            klog_debug!("serial: {} worker is task {}", line.name, id);
        }

        for (li, pi) in ATTACH_ORDER {
            let line = &self.lines[li];
            let port = &line.ports[pi];
            self.create_device(line, port, router, ns)?;
        }
        klog_info!("serial: 4 ports attached");
        Ok(())
    }

    fn create_device(
        &self,
        line: &'static SerialLine,
        port: &'static SerialPort,
        router: &InterruptRouter<'_>,
        ns: &dyn DeviceNamespace,
    ) -> Result<(), SerialError> {
        let node = DeviceNode {
            path: port.path,
            gid: DIALOUT_GID,
            mode: DeviceMode::TTY,
        };
        let tty = ns.attach_tty(&node, port).inspect_err(|e| {
            klog_warn!("serial: cannot mount {}: {:?}", port.path, e);
        })?;
        port.tty.call_once(|| tty);
        port.enable();

        if line.handler_installed.init_once() {
            router.install_handler(
                line.irq,
                serial_irq_handler,
                line as *const SerialLine as usize,
                line.name,
            )?;
        }
        Ok(())
    }
}

#[cfg(target_os = "none")]
static SERIAL: SerialDriver = SerialDriver::new(&kestrel_lib::ports::HardwarePorts);

/// Bring up the machine's serial terminals.
#[cfg(target_os = "none")]
pub fn serial_initialize(ns: &dyn DeviceNamespace) -> Result<(), SerialError> {
    let sched = kestrel_core::scheduler::scheduler().ok_or(SerialError::NotReady)?;
    let router = kestrel_core::irq::router().ok_or(SerialError::NotReady)?;
    SERIAL.initialize(sched, router, ns)
}
