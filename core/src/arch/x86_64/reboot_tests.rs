use std::cell::{Cell, RefCell};

use kestrel_lib::PortIo;
use kestrel_lib::ports::{PS2_COMMAND, PS2_STATUS};

use super::reboot::{RebootError, RebootServices, SCRATCH_FRAME_SIZE, reboot};

struct FakeBoard {
    frame: Option<u64>,
    page: RefCell<Vec<u8>>,
    mapped: Cell<Option<u64>>,
    idt: Cell<Option<(usize, u16)>>,
    busy_polls: Cell<u32>,
    status_reads: Cell<u32>,
    writes: RefCell<Vec<(u16, u8)>>,
    /// Snapshot of the IDT page when the first port access happened.
    page_at_io: RefCell<Option<Vec<u8>>>,
}

// SAFETY: each test drives a board from a single thread.
unsafe impl Sync for FakeBoard {}

impl FakeBoard {
    fn new(frame: Option<u64>, busy_polls: u32) -> Self {
        Self {
            frame,
            page: RefCell::new(vec![0xAA; SCRATCH_FRAME_SIZE]),
            mapped: Cell::new(None),
            idt: Cell::new(None),
            busy_polls: Cell::new(busy_polls),
            status_reads: Cell::new(0),
            writes: RefCell::new(Vec::new()),
            page_at_io: RefCell::new(None),
        }
    }

    fn snapshot_page(&self) {
        let mut snap = self.page_at_io.borrow_mut();
        if snap.is_none() {
            *snap = Some(self.page.borrow().clone());
        }
    }
}

impl PortIo for FakeBoard {
    fn inb(&self, port: u16) -> u8 {
        self.snapshot_page();
        assert_eq!(port, PS2_STATUS);
        self.status_reads.set(self.status_reads.get() + 1);
        let busy = self.busy_polls.get();
        if busy > 0 {
            self.busy_polls.set(busy - 1);
            0x02
        } else {
            0x00
        }
    }

    fn outb(&self, port: u16, value: u8) {
        self.snapshot_page();
        self.writes.borrow_mut().push((port, value));
    }
}

impl RebootServices for FakeBoard {
    fn allocate_frame(&self) -> Option<u64> {
        self.frame
    }

    fn map_from_physical(&self, phys: u64) -> *mut u8 {
        self.mapped.set(Some(phys));
        self.page.borrow_mut().as_mut_ptr()
    }

    fn load_idt(&self, base: *const u8, limit: u16) {
        self.idt.set(Some((base as usize, limit)));
    }
}

#[test]
fn pulses_reset_after_installing_empty_idt() {
    let board = FakeBoard::new(Some(0x9000), 3);
    assert_eq!(reboot(&board), Ok(()));

    assert_eq!(board.mapped.get(), Some(0x9000));
    let base = board.page.borrow().as_ptr() as usize;
    assert_eq!(board.idt.get(), Some((base, 0)));
    let snap = board.page_at_io.borrow().clone().expect("port access");
    assert!(snap.iter().all(|&b| b == 0));

    assert_eq!(board.status_reads.get(), 4);
    assert_eq!(board.writes.borrow().as_slice(), &[(PS2_COMMAND, 0xFE)]);
}

#[test]
fn idle_controller_is_written_without_waiting() {
    let board = FakeBoard::new(Some(0x1000), 0);
    assert_eq!(reboot(&board), Ok(()));
    assert_eq!(board.status_reads.get(), 1);
    assert_eq!(board.writes.borrow().len(), 1);
}

#[test]
fn missing_scratch_frame_aborts_before_touching_hardware() {
    let board = FakeBoard::new(None, 0);
    assert_eq!(reboot(&board), Err(RebootError::NoScratchFrame));
    assert_eq!(board.idt.get(), None);
    assert_eq!(board.status_reads.get(), 0);
    assert!(board.writes.borrow().is_empty());
}
