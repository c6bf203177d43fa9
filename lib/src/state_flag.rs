use core::sync::atomic::{AtomicBool, Ordering};

/// One-shot initialization marker.
pub struct InitFlag {
    done: AtomicBool,
}

impl InitFlag {
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Returns true for the single caller that should run the initializer.
    #[inline]
    pub fn init_once(&self) -> bool {
        self.done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn mark_set(&self) {
        self.done.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}
