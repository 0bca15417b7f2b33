//! Cooperative cancellation for session threads.
//!
//! The shutdown helper cannot kill a thread, so it asks: it calls
//! [`CancelToken::cancel`] and then unblocks whatever the thread may be parked
//! on (closes its queue, interrupts its socket or input). The thread notices at
//! its next [`checkpoint`](CancelToken::checkpoint) and returns.
//!
//! Some windows must not be cut short, e.g. between taking a message off a
//! queue and disposing of it. Inside a [`DeferGuard`] a checkpoint never
//! reports cancellation; the request stays pending and is seen at the first
//! checkpoint after the guard drops. Guards nest.
//!
//! The session workers only checkpoint between messages, never inside their
//! dequeue-to-dispose regions. There the guard marks the window and delays
//! nothing; it starts to matter once code inside a region checkpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Returned by [`CancelToken::checkpoint`] when the thread should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cancelled")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    deferred: AtomicUsize,
}

/// Shared cancellation state for one thread. Clones refer to the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.requested.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation was requested, deferred or not.
    pub fn is_cancelled(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Returns `true` while at least one [`DeferGuard`] is alive.
    pub fn is_deferred(&self) -> bool {
        self.inner.deferred.load(Ordering::Acquire) > 0
    }

    /// Safe point.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if cancellation was requested and no deferral
    /// region is active.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() && !self.is_deferred() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Enters a region in which cancellation is held back.
    #[must_use = "the region ends as soon as the guard is dropped"]
    pub fn defer(&self) -> DeferGuard<'_> {
        self.inner.deferred.fetch_add(1, Ordering::AcqRel);
        DeferGuard { token: self }
    }
}

/// Holds cancellation back until dropped.
#[derive(Debug)]
pub struct DeferGuard<'a> {
    token: &'a CancelToken,
}

impl Drop for DeferGuard<'_> {
    fn drop(&mut self) {
        self.token.inner.deferred.fetch_sub(1, Ordering::AcqRel);
    }
}
