use std::sync::atomic::{AtomicUsize, Ordering};

/// Monotonic `(processed, total)` pair advertised to pollers.
#[derive(Default)]
pub struct ProgressCounter {
    processed: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            processed: AtomicUsize::new(0),
            total: AtomicUsize::new(total),
        }
    }

    /// Grows the total when a later phase adds work. Never shrinks.
    pub fn add_work(&self, extra: usize) {
        self.total.fetch_add(extra, Ordering::SeqCst);
    }

    pub fn mark_done(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> (usize, usize) {
        // read processed first so the pair never overstates completion
        let processed = self.processed.load(Ordering::SeqCst);
        let total = self.total.load(Ordering::SeqCst);
        (processed, total)
    }
}
