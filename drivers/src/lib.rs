#![cfg_attr(not(test), no_std)]

pub mod devfs;
pub mod serial;

#[cfg(test)]
mod serial_tests;

pub use devfs::{DevError, DeviceMode, DeviceNamespace, DeviceNode, TtyEndpoint, TtyOutput};
pub use serial::{SerialDriver, SerialError, SerialLine, SerialPort};
