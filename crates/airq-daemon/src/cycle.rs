//! Scheduler-owned cycle state: the in-flight guard and the rotation cursor

use std::sync::atomic::{AtomicBool, Ordering};

/// Mutual exclusion for one kind of cycle. A cycle that cannot begin is
/// skipped, never queued.
#[derive(Debug, Default)]
pub struct CycleFlag {
    running: AtomicBool,
}

/// Held for the duration of a cycle; ends it on drop
#[derive(Debug)]
pub struct CycleTicket<'a> {
    flag: &'a CycleFlag,
}

impl CycleFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin_cycle(&self) -> Option<CycleTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleTicket { flag: self })
    }

    #[allow(dead_code)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for CycleTicket<'_> {
    fn drop(&mut self) {
        self.flag.running.store(false, Ordering::Release);
    }
}

/// Round-robin position over the active sensor list
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RotationCursor {
    position: usize,
}

impl RotationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take up to `max` items starting at the cursor, wrapping around,
    /// and advance past them
    pub fn next_batch<T: Clone>(&mut self, items: &[T], max: usize) -> Vec<T> {
        if items.is_empty() {
            return Vec::new();
        }
        let len = items.len();
        let start = self.position % len;
        let take = max.min(len);

        let batch = (0..take).map(|i| items[(start + i) % len].clone()).collect();
        self.position = (start + take) % len;
        batch
    }
}
