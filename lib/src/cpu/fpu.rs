//! FXSAVE / FXRSTOR of the legacy x87 + SSE register file.

pub const FX_SAVE_AREA_SIZE: usize = 512;

/// 512-byte FXSAVE image, 16-byte aligned as the instruction requires.
#[repr(C, align(16))]
#[derive(Clone)]
pub struct FxSaveArea {
    pub bytes: [u8; FX_SAVE_AREA_SIZE],
}

impl FxSaveArea {
    pub const fn zeroed() -> Self {
        Self {
            bytes: [0; FX_SAVE_AREA_SIZE],
        }
    }

    /// Power-on image: FCW = 0x037F, MXCSR = 0x1F80, everything else zero.
    pub const fn initial() -> Self {
        let mut bytes = [0u8; FX_SAVE_AREA_SIZE];
        bytes[0] = 0x7F;
        bytes[1] = 0x03;
        bytes[24] = 0x80;
        bytes[25] = 0x1F;
        Self { bytes }
    }
}

impl Default for FxSaveArea {
    fn default() -> Self {
        Self::initial()
    }
}

const _: () = assert!(core::mem::size_of::<FxSaveArea>() == FX_SAVE_AREA_SIZE);
const _: () = assert!(core::mem::align_of::<FxSaveArea>() == 16);

#[cfg(target_os = "none")]
#[inline]
pub fn fxsave(area: &mut FxSaveArea) {
    unsafe {
        core::arch::asm!("fxsave64 [{}]", in(reg) area.bytes.as_mut_ptr(), options(nostack, preserves_flags));
    }
}

#[cfg(target_os = "none")]
#[inline]
pub fn fxrstor(area: &FxSaveArea) {
    unsafe {
        core::arch::asm!("fxrstor64 [{}]", in(reg) area.bytes.as_ptr(), options(nostack, preserves_flags));
    }
}

#[cfg(not(target_os = "none"))]
static SIMULATED_REGISTER_FILE: spin::Mutex<FxSaveArea> = spin::Mutex::new(FxSaveArea::initial());

#[cfg(not(target_os = "none"))]
pub fn fxsave(area: &mut FxSaveArea) {
    area.bytes = SIMULATED_REGISTER_FILE.lock().bytes;
}

#[cfg(not(target_os = "none"))]
pub fn fxrstor(area: &FxSaveArea) {
    SIMULATED_REGISTER_FILE.lock().bytes = area.bytes;
}

/// Software register file backing `fxsave`/`fxrstor` in hosted builds.
#[cfg(not(target_os = "none"))]
pub fn simulated_register_file() -> spin::MutexGuard<'static, FxSaveArea> {
    SIMULATED_REGISTER_FILE.lock()
}
