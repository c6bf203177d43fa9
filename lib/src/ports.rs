use bitflags::bitflags;

/// Byte-wide port I/O.
///
/// Everything that touches an I/O port goes through this so that device
/// paths can be driven by a recording mock in hosted tests.
pub trait PortIo: Sync {
    fn inb(&self, port: u16) -> u8;
    fn outb(&self, port: u16, value: u8);
}

/// Real `in`/`out` instructions.
#[cfg(target_os = "none")]
pub struct HardwarePorts;

#[cfg(target_os = "none")]
impl PortIo for HardwarePorts {
    #[inline(always)]
    fn inb(&self, port: u16) -> u8 {
        let mut p = x86_64::instructions::port::Port::<u8>::new(port);
        // SAFETY: callers only name ports owned by the device they drive.
        unsafe { p.read() }
    }

    #[inline(always)]
    fn outb(&self, port: u16, value: u8) {
        let mut p = x86_64::instructions::port::Port::<u8>::new(port);
        // SAFETY: as above.
        unsafe { p.write(value) }
    }
}

pub const COM1: u16 = 0x3F8;
pub const COM2: u16 = 0x2F8;
pub const COM3: u16 = 0x3E8;
pub const COM4: u16 = 0x2E8;

pub const PS2_STATUS: u16 = 0x64;
pub const PS2_COMMAND: u16 = 0x64;
pub const PS2_STATUS_INPUT_FULL: u8 = 0x02;
pub const PS2_CMD_PULSE_RESET: u8 = 0xFE;

pub const UART_REG_RBR: u16 = 0;
pub const UART_REG_THR: u16 = 0;
pub const UART_REG_DLL: u16 = 0;
pub const UART_REG_IER: u16 = 1;
pub const UART_REG_DLM: u16 = 1;
pub const UART_REG_FCR: u16 = 2;
pub const UART_REG_LCR: u16 = 3;
pub const UART_REG_MCR: u16 = 4;
pub const UART_REG_LSR: u16 = 5;

pub const UART_LCR_DLAB: u8 = 0x80;
pub const UART_LCR_8N1: u8 = 0x03;
/// Enable, clear both FIFOs, 14-byte receive threshold.
pub const UART_FCR_INIT: u8 = 0xC7;
/// DTR | RTS | OUT2 (OUT2 gates the IRQ line on PC hardware).
pub const UART_MCR_INIT: u8 = 0x0B;
pub const UART_IER_RX_AVAILABLE: u8 = 0x01;
pub const UART_DIVISOR_115200: u16 = 1;

bitflags! {
    /// 16550 line status register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LineStatus: u8 {
        const DATA_READY = 0x01;
        const OVERRUN = 0x02;
        const PARITY_ERROR = 0x04;
        const FRAMING_ERROR = 0x08;
        const BREAK = 0x10;
        const THR_EMPTY = 0x20;
        const TX_IDLE = 0x40;
        const FIFO_ERROR = 0x80;
    }
}

#[inline]
pub fn line_status<P: PortIo + ?Sized>(io: &P, base: u16) -> LineStatus {
    LineStatus::from_bits_retain(io.inb(base + UART_REG_LSR))
}

/// Write one byte, polling until the transmit holding register is empty.
///
/// Lock-free: callers serialise access to `base` themselves.
#[inline]
pub fn serial_putc<P: PortIo + ?Sized>(io: &P, base: u16, byte: u8) {
    while !line_status(io, base).contains(LineStatus::THR_EMPTY) {
        core::hint::spin_loop();
    }
    io.outb(base + UART_REG_THR, byte);
}

/// Write a byte slice, converting lone `\n` into `\r\n`.
#[inline]
pub fn serial_write_bytes<P: PortIo + ?Sized>(io: &P, base: u16, bytes: &[u8]) {
    for &b in bytes {
        if b == b'\n' {
            serial_putc(io, base, b'\r');
        }
        serial_putc(io, base, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Loopback {
        writes: Mutex<Vec<(u16, u8)>>,
    }

    impl PortIo for Loopback {
        fn inb(&self, _port: u16) -> u8 {
            LineStatus::THR_EMPTY.bits()
        }
        fn outb(&self, port: u16, value: u8) {
            self.writes.lock().unwrap().push((port, value));
        }
    }

    #[test]
    fn newline_expands_to_crlf() {
        let io = Loopback {
            writes: Mutex::new(Vec::new()),
        };
        serial_write_bytes(&io, COM2, b"a\n");
        let w = io.writes.lock().unwrap();
        assert_eq!(&*w, &[(COM2, b'a'), (COM2, b'\r'), (COM2, b'\n')]);
    }
}
