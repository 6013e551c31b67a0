//! Re-entrancy latches for long-running phases.

use std::sync::atomic::{AtomicBool, Ordering};

/// A boolean in-progress flag acquired by compare-and-swap. Concurrent
/// acquirers get `None` and are expected to back off; the guard releases
/// the latch on every exit path.
#[derive(Debug, Default)]
pub struct Latch(AtomicBool);

impl Latch {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn acquire(&self) -> Option<LatchGuard<'_>> {
        if self.0.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(LatchGuard(&self.0))
        }
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
