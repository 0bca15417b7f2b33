//! A flag that can be claimed exactly once.

use std::sync::atomic::{AtomicBool, Ordering};

/// One-way `false -> true` flag. Exactly one caller of [`claim`](Self::claim)
/// ever sees `true`.
#[derive(Debug, Default)]
pub struct OnceFlag {
    claimed: AtomicBool,
}

impl OnceFlag {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    /// Sets the flag. Returns `true` only for the caller that set it.
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}
