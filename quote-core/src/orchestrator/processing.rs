//! Processing Guard
//!
//! At most one drain pass runs at a time. The flag works like a
//! non-reentrant mutex that never blocks: a second caller does not wait, it
//! simply learns that a pass is already running.
//!
//! The guard releases the flag when dropped, so a panicking pass cannot leave
//! the orchestrator stuck in `Processing`.

use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    /// Take the flag, or return `None` if a pass already holds it.
    pub(crate) fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
