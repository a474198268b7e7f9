//! Bounded lossy ingest buffer between the transport and the router.
//!
//! Writes never block and never fail. When the ring is full the oldest
//! unread envelope is overwritten and the alert callback is told.

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::Backoff;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Called with the number of items dropped by one write.
pub type DropAlert = Box<dyn Fn(usize) + Send + Sync>;

/// Idle sleep once spinning gives up in [`IngestBuffer::next`].
const PARK_INTERVAL: Duration = Duration::from_millis(1);

/// Buffer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferStats {
    pub capacity: usize,
    pub len: usize,
    pub received: u64,
    pub dropped: u64,
}

/// Single-producer, single-consumer ring with overwrite-oldest semantics.
pub struct IngestBuffer<T> {
    queue: ArrayQueue<T>,
    alert: Option<DropAlert>,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl<T> IngestBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    ///
    /// A zero capacity is raised to one; the config layer rejects zero before
    /// it gets here.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            alert: None,
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a buffer that reports drops through `alert`.
    pub fn with_alert(capacity: usize, alert: impl Fn(usize) + Send + Sync + 'static) -> Self {
        let mut buffer = Self::new(capacity);
        buffer.alert = Some(Box::new(alert));
        buffer
    }

    /// Non-blocking write. Overwrites the oldest item when full.
    #[inline]
    pub fn set(&self, item: T) {
        self.received.fetch_add(1, Ordering::Relaxed);
        if self.queue.force_push(item).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if let Some(alert) = &self.alert {
                alert(1);
            }
        }
    }

    /// Non-blocking read.
    #[inline]
    pub fn try_next(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Blocking read for consumers that have nothing else to do.
    pub fn next(&self) -> T {
        let backoff = Backoff::new();
        loop {
            if let Some(item) = self.queue.pop() {
                return item;
            }
            if backoff.is_completed() {
                std::thread::sleep(PARK_INTERVAL);
            } else {
                backoff.snooze();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            capacity: self.queue.capacity(),
            len: self.queue.len(),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl<T> fmt::Debug for IngestBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestBuffer").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_overflow_drops_oldest_with_one_alert() {
        let alerts = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));
        let (a, d) = (Arc::clone(&alerts), Arc::clone(&dropped));
        let buffer = IngestBuffer::with_alert(4, move |n| {
            a.fetch_add(1, Ordering::SeqCst);
            d.fetch_add(n, Ordering::SeqCst);
        });

        for i in 0..5 {
            buffer.set(i);
        }

        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.dropped(), 1);

        let drained: Vec<i32> = std::iter::from_fn(|| buffer.try_next()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_try_next_on_empty() {
        let buffer: IngestBuffer<u8> = IngestBuffer::new(2);
        assert!(buffer.try_next().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_stats() {
        let buffer = IngestBuffer::new(2);
        buffer.set("a");
        buffer.set("b");
        buffer.set("c");
        let stats = buffer.stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.len, 2);
        assert_eq!(stats.received, 3);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_blocking_next_across_threads() {
        let buffer = Arc::new(IngestBuffer::new(8));
        let producer = Arc::clone(&buffer);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.set(42_u32);
        });
        assert_eq!(buffer.next(), 42);
        handle.join().unwrap();
    }
}
