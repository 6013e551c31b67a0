//! Size-triggered flush queue feeding the key-value store.

use std::mem;
use std::sync::Mutex;

use tracing::debug;

/// Accumulates items under a mutex and hands them to the flush function in
/// insertion order once the configured size is reached. Durability is
/// whatever the flush function provides; every added item reaches the flush
/// function exactly once as long as [`Batcher::flush`] runs at shutdown.
pub struct Batcher<T> {
    size: usize,
    flush_fn: Box<dyn Fn(Vec<T>) + Send + Sync>,
    data: Mutex<Vec<T>>,
}

impl<T> Batcher<T> {
    pub fn new<F>(size: usize, flush_fn: F) -> Self
    where
        F: Fn(Vec<T>) + Send + Sync + 'static,
    {
        Self {
            size,
            flush_fn: Box::new(flush_fn),
            data: Mutex::new(Vec::with_capacity(size)),
        }
    }

    /// Append an item; flushes inside the same lock scope when the queue
    /// reaches the configured size.
    pub fn add(&self, item: T) {
        let mut data = self.data.lock().unwrap();
        data.push(item);
        if data.len() >= self.size {
            self.flush_locked(&mut data);
        }
    }

    /// Drain whatever is queued. No-op when the queue is empty.
    pub fn flush(&self) {
        let mut data = self.data.lock().unwrap();
        if !data.is_empty() {
            self.flush_locked(&mut data);
        }
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush_locked(&self, data: &mut Vec<T>) {
        let items = mem::replace(data, Vec::with_capacity(self.size));
        debug!(len = items.len(), "storing batch");
        (self.flush_fn)(items);
    }
}
