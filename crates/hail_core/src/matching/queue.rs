//! Single-producer/multi-consumer FIFO of riders awaiting matching.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

use super::types::RiderId;

#[derive(Debug, Default)]
struct QueueInner {
    items: VecDeque<RiderId>,
    closed: bool,
}

/// Blocking FIFO with shutdown-aware pops. Riders dequeue in posting order
/// regardless of which worker picks them up.
#[derive(Debug, Default)]
pub struct RiderQueue {
    inner: Mutex<QueueInner>,
    ready: Condvar,
}

impl RiderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a rider and wake one waiting worker. Returns `false` once the
    /// queue is closed.
    pub fn push(&self, rider_id: RiderId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return false;
        }
        inner.items.push_back(rider_id);
        self.ready.notify_one();
        true
    }

    /// Block until a rider is available or the queue closes. `None` means
    /// shutdown; remaining items are intentionally abandoned.
    pub fn pop(&self) -> Option<RiderId> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if inner.closed {
                return None;
            }
            if let Some(rider_id) = inner.items.pop_front() {
                return Some(rider_id);
            }
            inner = self.ready.wait(inner).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the queue and wake every waiter.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.closed = true;
        self.ready.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pops_in_fifo_order() {
        let queue = RiderQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn close_wakes_blocked_waiters() {
        let queue = Arc::new(RiderQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(waiter.join().expect("waiter thread"), None);
    }

    #[test]
    fn push_after_close_is_rejected() {
        let queue = RiderQueue::new();
        queue.close();
        assert!(!queue.push(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn blocked_pop_receives_later_push() {
        let queue = Arc::new(RiderQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(50));
        queue.push(42);

        assert_eq!(waiter.join().expect("waiter thread"), Some(42));
    }
}
