//! What a driver needs from the device namespace: mount a character
//! endpoint at a path and get back the sink its input flows into.

use bitflags::bitflags;
use kestrel_core::TaskCx;

bitflags! {
    /// Permission bits of a device node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceMode: u16 {
        const OWNER_READ = 0o400;
        const OWNER_WRITE = 0o200;
        const GROUP_READ = 0o040;
        const GROUP_WRITE = 0o020;
        const OTHER_READ = 0o004;
        const OTHER_WRITE = 0o002;
    }
}

impl DeviceMode {
    /// rw-rw----
    pub const TTY: Self = Self::from_bits_retain(0o660);
}

/// Group that owns serial lines.
pub const DIALOUT_GID: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceNode {
    pub path: &'static str,
    pub gid: u32,
    pub mode: DeviceMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevError {
    /// Something is already mounted at the path.
    PathInUse,
    /// The namespace has no room for another node.
    NoSpace,
}

/// Line-discipline input side of a terminal.
pub trait TtyEndpoint: Sync {
    fn input(&self, byte: u8);
}

/// Where a terminal's output bytes go.  Called from task context and may
/// yield while the device is busy.
pub trait TtyOutput: Sync {
    fn write_out(&self, cx: &TaskCx<'_>, byte: u8);
}

pub trait DeviceNamespace {
    /// Create a terminal whose output goes to `output`, mount its device
    /// side at `node.path` and return its input sink.
    fn attach_tty(
        &self,
        node: &DeviceNode,
        output: &'static dyn TtyOutput,
    ) -> Result<&'static dyn TtyEndpoint, DevError>;
}
