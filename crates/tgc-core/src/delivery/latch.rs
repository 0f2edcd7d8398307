use std::sync::atomic::{AtomicBool, Ordering};

/// One-way latch: starts clear, can be set once, never resets.
#[derive(Debug, Default)]
pub struct StickyFlag {
    set: AtomicBool,
}

impl StickyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Returns `true` if this call flipped it.
    pub fn set(&self) -> bool {
        !self.set.swap(true, Ordering::SeqCst)
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::SeqCst)
    }
}
