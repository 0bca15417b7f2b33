//! Synchronization primitives shared by the session threads.
//!
//! - [`queue`]: bounded, blocking FIFO with drop-newest backpressure.
//! - [`gate`]: one-shot N-party rendezvous (readiness and shutdown gates).
//! - [`once`]: a flag that can be claimed exactly once.
//! - [`cancel`]: cooperative per-thread cancellation with deferral regions.
//!
//! Everything here is built on `std::sync` locks and atomics. Blocking waits
//! park the thread on a [`Condvar`](std::sync::Condvar); nothing spins.

pub mod cancel;
pub mod gate;
pub mod once;
pub mod queue;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if another thread panicked while
/// holding it.
///
/// The state protected by the session's mutexes stays consistent across a
/// panic (every critical section is a handful of field updates), and teardown
/// must still be able to run after a worker died.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
