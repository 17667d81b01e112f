use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::record::LogRecord;

/// Bounded free-list of reusable [`LogRecord`] boxes.
///
/// Emitters acquire a record, fill it, and hand it to the queue; the
/// dispatch task releases it after fan-out. Acquiring from an empty pool
/// allocates and counts a miss; releasing into a full pool drops the box.
/// In steady state every record comes from and returns to the free list.
pub struct RecordPool {
    free: Mutex<Vec<Box<LogRecord>>>,
    capacity: usize,
    misses: AtomicU64,
}

impl RecordPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut free = Vec::with_capacity(capacity);
        free.extend((0..capacity).map(|_| Box::new(LogRecord::default())));
        Self {
            free: Mutex::new(free),
            capacity,
            misses: AtomicU64::new(0),
        }
    }

    /// Take a reset record from the pool, allocating on exhaustion.
    pub fn acquire(&self) -> Box<LogRecord> {
        if let Some(rec) = self.free.lock().pop() {
            return rec;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        Box::new(LogRecord::default())
    }

    /// Return a record, resetting it but keeping its buffers.
    pub fn release(&self, mut rec: Box<LogRecord>) {
        rec.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(rec);
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of acquisitions that had to allocate.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
