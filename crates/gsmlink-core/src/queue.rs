//! Fixed-capacity FIFO queues.
//!
//! Two instantiations carry all of the engine's cross-cutting state: the
//! unsolicited-event queue (owned lines copied out of the receive buffer)
//! and the SIM-storage index queues (locations of messages held by the
//! modem, not message bodies).

use std::collections::VecDeque;

/// A FIFO with a compile-time capacity `N`.
///
/// Invariant: `count() <= N`. Enqueueing into a full queue fails and leaves
/// the queue untouched; the rejected value is handed back to the caller.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T, const N: usize> {
    items: VecDeque<T>,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    /// Create an empty queue.
    pub fn new() -> Self {
        BoundedQueue {
            items: VecDeque::with_capacity(N),
        }
    }

    /// Append `value` at the tail.
    ///
    /// Takes ownership, so the stored entry is independent of whatever
    /// buffer the caller produced it from.
    pub fn enqueue(&mut self, value: T) -> std::result::Result<(), T> {
        if self.items.len() >= N {
            return Err(value);
        }
        self.items.push_back(value);
        Ok(())
    }

    /// Remove and return the head, or `None` if the queue is empty.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Borrow the head without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    /// Number of stored entries.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Maximum number of entries.
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= N
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q: BoundedQueue<&str, 4> = BoundedQueue::new();
        q.enqueue("a").unwrap();
        q.enqueue("b").unwrap();
        q.enqueue("c").unwrap();

        assert_eq!(q.dequeue(), Some("a"));
        assert_eq!(q.dequeue(), Some("b"));
        assert_eq!(q.dequeue(), Some("c"));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn enqueue_on_full_is_rejected_without_mutation() {
        let mut q: BoundedQueue<u16, 2> = BoundedQueue::new();
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert!(q.is_full());

        assert_eq!(q.enqueue(3), Err(3));
        assert_eq!(q.count(), 2);
        assert_eq!(q.peek(), Some(&1));
    }

    #[test]
    fn empty_queue_reads_fail() {
        let mut q: BoundedQueue<String, 3> = BoundedQueue::new();
        assert!(q.peek().is_none());
        assert!(q.dequeue().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn peek_is_non_destructive() {
        let mut q: BoundedQueue<u16, 3> = BoundedQueue::new();
        q.enqueue(7).unwrap();
        assert_eq!(q.peek(), Some(&7));
        assert_eq!(q.peek(), Some(&7));
        assert_eq!(q.count(), 1);
    }

    #[test]
    fn stored_strings_are_independent_copies() {
        let mut q: BoundedQueue<String, 3> = BoundedQueue::new();
        let mut rx = String::from("+CMTI: \"SM\",3");
        q.enqueue(rx.clone()).unwrap();
        rx.clear();
        rx.push_str("OK");

        assert_eq!(q.dequeue().as_deref(), Some("+CMTI: \"SM\",3"));
    }

    #[test]
    fn clear_drops_everything() {
        let mut q: BoundedQueue<String, 3> = BoundedQueue::new();
        q.enqueue("x".into()).unwrap();
        q.enqueue("y".into()).unwrap();
        q.clear();
        assert_eq!(q.count(), 0);
        assert!(q.enqueue("z".into()).is_ok());
    }

    #[test]
    fn count_never_exceeds_capacity() {
        let mut q: BoundedQueue<u16, 10> = BoundedQueue::new();
        for i in 0..25u16 {
            let _ = q.enqueue(i);
            if i % 7 == 0 {
                q.dequeue();
            }
            assert!(q.count() <= q.capacity());
        }
    }
}
