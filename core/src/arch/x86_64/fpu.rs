use kestrel_lib::cpu;

use crate::scheduler::task::Task;

/// FXSAVE the live x87/SSE registers into `task`'s image.
#[inline]
pub fn save_floating(task: &mut Task) {
    cpu::fxsave(&mut task.fpu);
}

/// FXRSTOR `task`'s image into the live registers.
#[inline]
pub fn restore_floating(task: &Task) {
    cpu::fxrstor(&task.fpu);
}
