//! IRQ routing: the handler table, dispatch and the interrupt-side
//! capability.
//!
//! Controller specifics (EOI, masking) come in through
//! [`InterruptController`].  Handlers run with the table lock released but
//! serialized per line, receive an [`IrqCx`] and must not block.

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use kestrel_abi::arch::x86_64::idt::{IRQ_BASE_VECTOR, IRQ_LINES};
use kestrel_lib::{IrqMutex, TrapFrame, klog_debug, klog_info, klog_warn};

use crate::scheduler::scheduler::Scheduler;
use crate::scheduler::wait_queue::WaitQueue;

pub trait InterruptController: Sync {
    fn eoi(&self, line: u8);
    fn mask(&self, line: u8);
    fn unmask(&self, line: u8);
}

/// IRQ handler: interrupt capability plus the context word given at install.
pub type IrqHandler = fn(&IrqCx<'_>, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    InvalidLine,
    LineInUse,
    NotInstalled,
}

/// Capability handed to interrupt handlers.  It can acknowledge and wake
/// queues but has no way to sleep.
pub struct IrqCx<'a> {
    sched: &'a Scheduler<'a>,
    controller: &'a dyn InterruptController,
    line: u8,
    cpu: usize,
    frame: &'a TrapFrame,
    acked: Cell<bool>,
}

impl<'a> IrqCx<'a> {
    #[inline]
    pub fn line(&self) -> u8 {
        self.line
    }

    #[inline]
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    #[inline]
    pub fn frame(&self) -> &TrapFrame {
        self.frame
    }

    /// Acknowledge the controller.  Only the first call sends an EOI.
    pub fn ack(&self) {
        if !self.acked.replace(true) {
            self.controller.eoi(self.line);
        }
    }

    pub fn acked(&self) -> bool {
        self.acked.get()
    }

    /// Make every task parked on `queue` READY.
    pub fn wakeup(&self, queue: &WaitQueue) -> usize {
        self.sched.wakeup_queue(queue)
    }

    /// Timeslice accounting for the interrupted core.
    pub fn tick(&self) {
        self.sched.timer_tick(self.cpu);
    }
}

#[derive(Clone, Copy)]
struct IrqEntry {
    handler: Option<IrqHandler>,
    context: usize,
    name: &'static str,
    count: u64,
    masked: bool,
    reported_unhandled: bool,
}

impl IrqEntry {
    const fn new() -> Self {
        Self {
            handler: None,
            context: 0,
            name: "",
            count: 0,
            masked: true,
            reported_unhandled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqStats {
    pub count: u64,
    pub masked: bool,
    pub installed: bool,
    pub in_service: bool,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// No handler; the line has been masked.
    Unhandled,
    /// Vector outside the IRQ range.
    Spurious,
    /// Dropped because the machine is halting.
    Dropped,
}

pub struct InterruptRouter<'a> {
    table: IrqMutex<[IrqEntry; IRQ_LINES]>,
    in_service: [AtomicBool; IRQ_LINES],
    controller: &'a dyn InterruptController,
    sched: &'a Scheduler<'a>,
}

impl<'a> InterruptRouter<'a> {
    pub const fn new(controller: &'a dyn InterruptController, sched: &'a Scheduler<'a>) -> Self {
        Self {
            table: IrqMutex::new([IrqEntry::new(); IRQ_LINES]),
            in_service: [const { AtomicBool::new(false) }; IRQ_LINES],
            controller,
            sched,
        }
    }

    /// Register `handler` on `line` and unmask it.
    pub fn install_handler(
        &self,
        line: u8,
        handler: IrqHandler,
        context: usize,
        name: &'static str,
    ) -> Result<(), IrqError> {
        let idx = line as usize;
        if idx >= IRQ_LINES {
            klog_warn!("IRQ: refusing handler '{}' for invalid line {}", name, line);
            return Err(IrqError::InvalidLine);
        }
        {
            let mut table = self.table.lock();
            let entry = &mut table[idx];
            if entry.handler.is_some() {
                klog_warn!("IRQ: line {} already owned by '{}'", line, entry.name);
                return Err(IrqError::LineInUse);
            }
            entry.handler = Some(handler);
            entry.context = context;
            entry.name = name;
            entry.masked = false;
            entry.reported_unhandled = false;
        }
        self.controller.unmask(line);
        klog_debug!("IRQ: registered '{}' on line {}", name, line);
        Ok(())
    }

    pub fn remove_handler(&self, line: u8) -> Result<(), IrqError> {
        let idx = line as usize;
        if idx >= IRQ_LINES {
            return Err(IrqError::InvalidLine);
        }
        {
            let mut table = self.table.lock();
            if table[idx].handler.is_none() {
                return Err(IrqError::NotInstalled);
            }
            table[idx] = IrqEntry::new();
        }
        self.controller.mask(line);
        klog_debug!("IRQ: removed handler on line {}", line);
        Ok(())
    }

    pub fn stats(&self, line: u8) -> Option<IrqStats> {
        let idx = line as usize;
        if idx >= IRQ_LINES {
            return None;
        }
        let entry = self.table.lock()[idx];
        Some(IrqStats {
            count: entry.count,
            masked: entry.masked,
            installed: entry.handler.is_some(),
            in_service: self.in_service[idx].load(Ordering::Acquire),
            name: entry.name,
        })
    }

    /// Route one interrupt, then take the preemption point on the way out.
    pub fn dispatch(&self, frame: &TrapFrame) -> Dispatch {
        if self.sched.halt().is_frozen() {
            return Dispatch::Dropped;
        }
        let cpu = self.sched.this_cpu();
        if let Some(core) = self.sched.cores().get(cpu) {
            core.interrupt_count.fetch_add(1, Ordering::Relaxed);
        }

        let vector = (frame.int_no & 0xFF) as u8;
        let line = vector.wrapping_sub(IRQ_BASE_VECTOR);
        if vector < IRQ_BASE_VECTOR || line as usize >= IRQ_LINES {
            klog_info!("IRQ: spurious vector {}", vector);
            return Dispatch::Spurious;
        }
        let idx = line as usize;

        while self.in_service[idx]
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        let snapshot = {
            let mut table = self.table.lock();
            let entry = &mut table[idx];
            match entry.handler {
                Some(h) => {
                    entry.count = entry.count.wrapping_add(1);
                    Some((h, entry.context))
                }
                None => {
                    let first = !entry.reported_unhandled;
                    entry.reported_unhandled = true;
                    entry.masked = true;
                    if first {
                        klog_info!("IRQ: unhandled line {} (vector {}), masking", line, vector);
                    }
                    None
                }
            }
        };

        let outcome = match snapshot {
            Some((handler, context)) => {
                let cx = IrqCx {
                    sched: self.sched,
                    controller: self.controller,
                    line,
                    cpu,
                    frame,
                    acked: Cell::new(false),
                };
                handler(&cx, context);
                if !cx.acked() {
                    klog_debug!("IRQ: handler on line {} did not acknowledge", line);
                    cx.ack();
                }
                Dispatch::Handled
            }
            None => {
                self.controller.mask(line);
                self.controller.eoi(line);
                Dispatch::Unhandled
            }
        };

        self.in_service[idx].store(false, Ordering::Release);

        if outcome == Dispatch::Handled {
            self.sched.preempt(cpu);
        }
        outcome
    }
}

/// Timer line handler: acknowledge and account one tick.
pub fn timer_irq_handler(cx: &IrqCx<'_>, _context: usize) {
    cx.ack();
    cx.tick();
}

// =============================================================================
// Machine-wide instance
// =============================================================================

static ROUTER: spin::Once<InterruptRouter<'static>> = spin::Once::new();

pub fn init_irq(
    controller: &'static dyn InterruptController,
    sched: &'static Scheduler<'static>,
) -> &'static InterruptRouter<'static> {
    ROUTER.call_once(|| {
        klog_debug!("IRQ: router initialized ({} lines)", IRQ_LINES);
        InterruptRouter::new(controller, sched)
    })
}

pub fn router() -> Option<&'static InterruptRouter<'static>> {
    ROUTER.get()
}

pub fn install_handler(
    line: u8,
    handler: IrqHandler,
    context: usize,
    name: &'static str,
) -> Result<(), IrqError> {
    router()
        .ok_or(IrqError::NotInstalled)?
        .install_handler(line, handler, context, name)
}

/// Entry from the IDT stubs for vectors `0x20..0x30`.
pub fn irq_dispatch(frame: &TrapFrame) -> Dispatch {
    match router() {
        Some(r) => r.dispatch(frame),
        None => Dispatch::Spurious,
    }
}
