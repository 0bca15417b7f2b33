//! One-shot N-party rendezvous.
//!
//! A [`Rendezvous`] releases every waiting party at the moment the N-th party
//! arrives, and never blocks again afterwards. The session uses two of them:
//! a 4-party readiness gate so no worker starts its loop before all four
//! exist, and a 2-party gate between the shutdown helper and the main thread.
//!
//! Unlike [`std::sync::Barrier`] the gate fires only once and can be
//! [aborted](Rendezvous::abort), which releases everyone with an error.

use std::sync::{Condvar, Mutex, PoisonError};

use super::lock;

/// The gate was aborted before all parties arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rendezvous aborted before all parties arrived")]
pub struct Aborted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Released,
    Aborted,
}

#[derive(Debug)]
struct State {
    arrived: usize,
    phase: Phase,
}

/// Fires once, when `parties` callers have arrived.
#[derive(Debug)]
pub struct Rendezvous {
    parties: usize,
    state: Mutex<State>,
    released: Condvar,
}

impl Rendezvous {
    /// Creates a gate for `parties` callers.
    ///
    /// # Panics
    ///
    /// Panics if `parties` is zero.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "rendezvous needs at least one party");
        Self {
            parties,
            state: Mutex::new(State {
                arrived: 0,
                phase: Phase::Waiting,
            }),
            released: Condvar::new(),
        }
    }

    /// Arrives at the gate and waits for the others.
    ///
    /// The last party to arrive releases everyone, itself included. Arriving
    /// after release returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if [`abort`](Self::abort) was called before the gate
    /// released.
    pub fn arrive(&self) -> Result<(), Aborted> {
        let mut state = lock(&self.state);
        match state.phase {
            Phase::Released => return Ok(()),
            Phase::Aborted => return Err(Aborted),
            Phase::Waiting => {}
        }

        state.arrived += 1;
        if state.arrived == self.parties {
            state.phase = Phase::Released;
            drop(state);
            self.released.notify_all();
            return Ok(());
        }

        let state = self
            .released
            .wait_while(state, |s| s.phase == Phase::Waiting)
            .unwrap_or_else(PoisonError::into_inner);
        match state.phase {
            Phase::Aborted => Err(Aborted),
            _ => Ok(()),
        }
    }

    /// Releases all current and future waiters with [`Aborted`].
    ///
    /// Has no effect once the gate has released normally.
    pub fn abort(&self) {
        let mut state = lock(&self.state);
        if state.phase == Phase::Waiting {
            state.phase = Phase::Aborted;
            drop(state);
            self.released.notify_all();
        }
    }

    /// Number of parties that have arrived so far.
    pub fn arrived(&self) -> usize {
        lock(&self.state).arrived
    }

    /// Returns `true` once every party has arrived.
    pub fn is_released(&self) -> bool {
        lock(&self.state).phase == Phase::Released
    }

    /// Number of parties the gate waits for.
    #[must_use]
    pub const fn parties(&self) -> usize {
        self.parties
    }
}
