//! Bounded blocking FIFO for handing messages between session threads.
//!
//! # Overview
//!
//! - [`BoundedQueue::enqueue`] never blocks. When the queue is at capacity the
//!   item is handed back as [`Rejected::Full`] and the producer decides what to
//!   do with it (the session drops it and prints a notice). This is a
//!   *drop-newest* policy: what is already queued is never evicted.
//! - [`BoundedQueue::dequeue`] parks the caller on a condition variable while
//!   the queue is empty, then transfers ownership of the oldest item.
//! - [`BoundedQueue::close`] refuses further items and wakes every parked
//!   consumer. Items already accepted are still handed out; `dequeue` returns
//!   `None` only once the queue is closed *and* empty.
//!
//! # Example
//!
//! ```
//! use duplex::sync::queue::{BoundedQueue, Rejected};
//!
//! let queue = BoundedQueue::new(1);
//! queue.enqueue("first").unwrap();
//! assert!(matches!(queue.enqueue("second"), Err(Rejected::Full("second"))));
//! assert_eq!(queue.dequeue(), Some("first"));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex};

use super::lock;

/// An item the queue refused. Ownership goes back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum Rejected<T> {
    /// The queue held `capacity` items.
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> Rejected<T> {
    /// Recovers the refused item.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }

    /// Returns `true` if the item was refused for lack of space.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("queue is full"),
            Self::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO guarded by a single mutex.
///
/// Any number of producers and consumers may share a `&BoundedQueue`; the
/// session uses exactly one of each per queue.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue that holds at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be greater than 0");
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Appends `item` without blocking.
    ///
    /// # Errors
    ///
    /// Returns the item inside [`Rejected::Full`] when the queue is at
    /// capacity, or inside [`Rejected::Closed`] after [`close`](Self::close).
    /// The queue's contents are unchanged in both cases.
    pub fn enqueue(&self, item: T) -> Result<(), Rejected<T>> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(Rejected::Closed(item));
        }
        if state.items.len() == self.capacity {
            return Err(Rejected::Full(item));
        }
        state.items.push_back(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Removes the oldest item, parking the caller while the queue is empty.
    ///
    /// Returns `None` once the queue has been closed and drained.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = lock(&self.state);
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Removes the oldest item if there is one, closed or not.
    pub fn try_dequeue(&self) -> Option<T> {
        lock(&self.state).items.pop_front()
    }

    /// Stops accepting items and wakes every parked consumer.
    ///
    /// Idempotent. What was already queued stays there for consumers.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.available.notify_all();
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        lock(&self.state).items.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("BoundedQueue")
            .field("len", &state.items.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}
