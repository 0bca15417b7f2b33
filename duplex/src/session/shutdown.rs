//! Exactly-once session teardown.
//!
//! Any thread may call [`ShutdownCoordinator::request_shutdown`]. The first
//! call spawns a single helper thread; every later call is a no-op. The helper
//! meets the main thread at a two-party rendezvous and only then runs the
//! [`Teardown`], so the main thread never joins a helper that does not exist
//! yet and the helper never stops workers the main thread is still
//! registering.
//!
//! ```text
//!  worker ──request_shutdown()──▶ spawn helper ──┐
//!                                                ▼
//!  main ──wait_for_completion()──▶ rendezvous ◀── helper
//!    │                                           │
//!    │                                   teardown.teardown()
//!    └──────────── join helper ◀─────────────────┘
//! ```

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::WorkerRole;
use crate::net::EndpointError;
use crate::net::endpoint::CloseOutcome;
use crate::sync::cancel::CancelToken;
use crate::sync::gate::Rendezvous;
use crate::sync::lock;
use crate::sync::once::OnceFlag;
use crate::trace::{debug, error, info, warn};

/// How a worker thread ended up during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    /// Cancelled, unblocked and joined.
    CleanStop,
    /// The thread had already returned on its own.
    AlreadyStopped,
    /// The thread could not be unblocked and was left running.
    CancelFailed,
    /// The thread panicked.
    JoinFailed,
    /// The thread was never spawned.
    NotStarted,
}

impl StopStatus {
    /// Returns `true` for outcomes that need no diagnostic.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::CleanStop | Self::AlreadyStopped)
    }
}

impl fmt::Display for StopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CleanStop => "stopped",
            Self::AlreadyStopped => "had already stopped",
            Self::CancelFailed => "has failed to cancel",
            Self::JoinFailed => "has failed to join",
            Self::NotStarted => "was never started",
        })
    }
}

/// Result of one teardown run.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Per-worker outcome, in the order the workers were stopped.
    pub workers: Vec<(WorkerRole, StopStatus)>,
    /// What closing the shared endpoint found.
    pub endpoint: Result<CloseOutcome, EndpointError>,
}

impl ShutdownReport {
    /// Outcome recorded for `role`.
    #[must_use]
    pub fn status(&self, role: WorkerRole) -> Option<StopStatus> {
        self.workers
            .iter()
            .find(|(r, _)| *r == role)
            .map(|&(_, status)| status)
    }

    /// Returns `true` if every worker stopped and the endpoint closed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.workers.iter().all(|(_, status)| status.is_ok()) && self.endpoint.is_ok()
    }

    /// One line per problem, for printing at exit.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .workers
            .iter()
            .filter(|(_, status)| !status.is_ok())
            .map(|(role, status)| format!("{role} thread {status}"))
            .collect();
        if let Err(e) = &self.endpoint {
            lines.push(format!("failed to close socket: {e}"));
        }
        lines
    }
}

/// The work the shutdown helper performs once.
pub trait Teardown: Send + Sync + 'static {
    fn teardown(&self) -> ShutdownReport;
}

/// A spawned worker thread and the means to stop it.
pub struct WorkerHandle {
    role: WorkerRole,
    cancel: CancelToken,
    unblock: Box<dyn Fn() -> io::Result<()> + Send + Sync>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// `unblock` must make whatever the thread may be blocked on return, so
    /// that the thread reaches its next cancellation checkpoint.
    pub fn new(
        role: WorkerRole,
        cancel: CancelToken,
        unblock: impl Fn() -> io::Result<()> + Send + Sync + 'static,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            role,
            cancel,
            unblock: Box::new(unblock),
            thread,
        }
    }

    #[must_use]
    pub const fn role(&self) -> WorkerRole {
        self.role
    }

    /// Cancels, unblocks and joins the thread.
    ///
    /// If unblocking fails the thread is detached instead of joined, since
    /// the join could wait forever.
    pub fn stop(self) -> StopStatus {
        if self.thread.is_finished() {
            return match self.thread.join() {
                Ok(()) => StopStatus::AlreadyStopped,
                Err(_) => {
                    warn!(role = %self.role, "worker panicked");
                    StopStatus::JoinFailed
                }
            };
        }

        self.cancel.cancel();
        if let Err(_e) = (self.unblock)() {
            warn!(role = %self.role, error = %_e, "failed to unblock worker, detaching");
            return StopStatus::CancelFailed;
        }

        debug!(role = %self.role, "waiting for worker to exit");
        match self.thread.join() {
            Ok(()) => StopStatus::CleanStop,
            Err(_) => {
                warn!(role = %self.role, "worker panicked");
                StopStatus::JoinFailed
            }
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("role", &self.role)
            .field("finished", &self.thread.is_finished())
            .finish_non_exhaustive()
    }
}

/// Error returned by [`ShutdownCoordinator::wait_for_completion`].
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// The helper thread could not be spawned; nothing was torn down.
    #[error("failed to start shutdown thread: {0}")]
    HelperSpawn(#[source] io::Error),
    /// The helper thread panicked before returning its report.
    #[error("shutdown thread panicked")]
    HelperPanicked,
}

enum Helper {
    NotSpawned,
    Running(JoinHandle<ShutdownReport>),
    SpawnFailed(io::Error),
    Joined,
}

/// Owns the shutdown flag and the single helper thread.
pub struct ShutdownCoordinator {
    requested: OnceFlag,
    rendezvous: Arc<Rendezvous>,
    teardown: Arc<dyn Teardown>,
    helper: Mutex<Helper>,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new(teardown: Arc<dyn Teardown>) -> Self {
        Self {
            requested: OnceFlag::new(),
            rendezvous: Arc::new(Rendezvous::new(2)),
            teardown,
            helper: Mutex::new(Helper::NotSpawned),
        }
    }

    /// Starts teardown. Idempotent and safe to call from any thread,
    /// including the workers being torn down.
    pub fn request_shutdown(&self) {
        let mut helper = lock(&self.helper);
        if !self.requested.claim() {
            return;
        }
        info!("shutdown requested");

        let rendezvous = Arc::clone(&self.rendezvous);
        let teardown = Arc::clone(&self.teardown);
        let spawned = thread::Builder::new()
            .name("duplex-shutdown".into())
            .spawn(move || {
                // Aborted only when the main thread gave up on us.
                let _ = rendezvous.arrive();
                debug!("tearing down session");
                teardown.teardown()
            });

        *helper = match spawned {
            Ok(handle) => Helper::Running(handle),
            Err(e) => {
                error!(error = %e, "failed to spawn shutdown thread");
                self.rendezvous.abort();
                Helper::SpawnFailed(e)
            }
        };
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.is_claimed()
    }

    /// Blocks until teardown has finished and returns its report.
    ///
    /// Meant for the main thread, once, after every worker handle is
    /// registered with the [`Teardown`].
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::HelperSpawn`] if the helper thread could not be
    /// started and [`ShutdownError::HelperPanicked`] if it panicked.
    pub fn wait_for_completion(&self) -> Result<ShutdownReport, ShutdownError> {
        // Fails only if the helper could not be spawned; that case is
        // reported below.
        let _ = self.rendezvous.arrive();

        let helper = std::mem::replace(&mut *lock(&self.helper), Helper::Joined);
        match helper {
            Helper::Running(handle) => handle.join().map_err(|_| ShutdownError::HelperPanicked),
            Helper::SpawnFailed(e) => Err(ShutdownError::HelperSpawn(e)),
            // The rendezvous only passes once a helper exists.
            Helper::NotSpawned | Helper::Joined => Err(ShutdownError::HelperPanicked),
        }
    }
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("requested", &self.is_requested())
            .finish_non_exhaustive()
    }
}
