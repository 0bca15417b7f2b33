//! A running chat session: four worker threads, two queues, one socket.
//!
//! ```text
//!  input ──▶ [outbound queue] ──▶ transmitter ──▶ UDP ──▶ peer
//!  peer ──▶ UDP ──▶ receiver ──▶ [inbound queue] ──▶ display
//! ```
//!
//! [`Session::start`] binds the socket, spawns the workers and returns. Each
//! worker waits at a shared readiness gate until all four exist. The session
//! ends when either side sends the termination marker, input runs out, or the
//! network fails; whichever thread notices first calls
//! [`ShutdownCoordinator::request_shutdown`], and the main thread collects the
//! result with [`Session::wait_for_completion`].
//!
//! # Example
//!
//! ```no_run
//! use duplex::net::resolve_ipv4;
//! use duplex::session::{Session, SessionConfig, SessionIo};
//!
//! let config = SessionConfig {
//!     local_port: 9001,
//!     remote: resolve_ipv4("localhost", 9002)?,
//!     ..SessionConfig::default()
//! };
//! let session = Session::start(&config, SessionIo::stdio()?)?;
//! let report = session.wait_for_completion()?;
//! assert!(report.is_clean());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod display;
mod input;
mod receiver;
pub mod shutdown;
mod transmitter;

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::message::Message;
use crate::net::{Bind, EndpointError, SharedEndpoint, UdpBinder};
use crate::stdio::{Console, InputSource, StdinSource};
use crate::sync::cancel::CancelToken;
use crate::sync::gate::Rendezvous;
use crate::sync::lock;
use crate::sync::queue::BoundedQueue;
use crate::trace::{debug, error, info};

use display::DisplayWorker;
use input::InputWorker;
use receiver::ReceiverWorker;
use transmitter::TransmitterWorker;

pub use shutdown::{ShutdownCoordinator, ShutdownError, ShutdownReport, StopStatus};
use shutdown::{Teardown, WorkerHandle};

/// Default capacity of each message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Number of worker threads that meet at the readiness gate.
const WORKER_COUNT: usize = 4;

/// Session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Local UDP port to bind on all interfaces.
    pub local_port: u16,
    /// Peer address.
    pub remote: SocketAddr,
    /// Capacity of the input → transmitter queue.
    pub outbound_capacity: usize,
    /// Capacity of the receiver → display queue.
    pub inbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_port: 9001,
            remote: SocketAddr::from((Ipv4Addr::LOCALHOST, 9002)),
            outbound_capacity: DEFAULT_QUEUE_CAPACITY,
            inbound_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The session's four workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerRole {
    Input,
    Transmitter,
    Receiver,
    Display,
}

impl WorkerRole {
    /// Order in which teardown stops the workers.
    pub const TEARDOWN_ORDER: [Self; WORKER_COUNT] =
        [Self::Display, Self::Input, Self::Receiver, Self::Transmitter];

    const fn thread_name(self) -> &'static str {
        match self {
            Self::Input => "duplex-input",
            Self::Transmitter => "duplex-tx",
            Self::Receiver => "duplex-rx",
            Self::Display => "duplex-display",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Transmitter => "transmitter",
            Self::Receiver => "receiver",
            Self::Display => "display",
        })
    }
}

/// Error starting or finishing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Binding the local port failed.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    /// A queue capacity of zero was configured.
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,
    /// A worker thread could not be spawned. Workers already running were
    /// torn down.
    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: WorkerRole,
        #[source]
        source: io::Error,
    },
    /// Teardown did not run to completion.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// The outside world as seen by a session.
pub struct SessionIo {
    /// Source of outgoing text.
    pub input: Box<dyn InputSource>,
    /// Destination of received text and notices.
    pub console: Console,
    /// Creates the UDP endpoint.
    pub binder: Box<dyn Bind>,
}

impl SessionIo {
    /// Standard input, standard output and a real UDP socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the stdin wakeup pipe cannot be created.
    pub fn stdio() -> io::Result<Self> {
        Ok(Self {
            input: Box::new(StdinSource::new()?),
            console: Console::stdout(),
            binder: Box::new(UdpBinder),
        })
    }
}

impl fmt::Debug for SessionIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIo").finish_non_exhaustive()
    }
}

/// State every worker can see.
pub(crate) struct SessionContext {
    pub(crate) readiness: Rendezvous,
    pub(crate) shutdown: ShutdownCoordinator,
    pub(crate) console: Console,
}

/// Body of a worker thread.
///
/// `run` returns when the worker is done: after the termination marker, on a
/// fatal error, or at the first cancellation checkpoint after teardown asked
/// it to stop. Queue consumers reach that checkpoint only once their queue
/// is empty.
pub(crate) trait Worker: Send + 'static {
    fn run(&mut self, cancel: &CancelToken, context: &SessionContext);
}

/// Next item for a worker that drains `queue`.
///
/// Anything the queue accepted is handed out, cancelled or not. The
/// checkpoint only applies once the queue is empty; `None` means stop.
pub(crate) fn next_queued<T>(queue: &BoundedQueue<T>, cancel: &CancelToken) -> Option<T> {
    if let Some(item) = queue.try_dequeue() {
        return Some(item);
    }
    cancel.checkpoint().ok()?;
    queue.dequeue()
}

/// Registered worker handles plus the endpoint, torn down in order.
struct Roster {
    workers: Mutex<Vec<WorkerHandle>>,
    endpoint: Arc<SharedEndpoint>,
}

impl Roster {
    fn register(&self, handle: WorkerHandle) {
        lock(&self.workers).push(handle);
    }
}

impl Teardown for Roster {
    fn teardown(&self) -> ShutdownReport {
        let mut handles = std::mem::take(&mut *lock(&self.workers));

        let workers = WorkerRole::TEARDOWN_ORDER
            .into_iter()
            .map(|role| {
                let status = match handles.iter().position(|h| h.role() == role) {
                    Some(i) => handles.swap_remove(i).stop(),
                    None => StopStatus::NotStarted,
                };
                debug!(%role, %status, "worker stopped");
                (role, status)
            })
            .collect();

        let endpoint = self.endpoint.close();
        if let Err(_e) = &endpoint {
            error!(error = %_e, "failed to close endpoint");
        }
        ShutdownReport { workers, endpoint }
    }
}

/// Handle to a running session.
pub struct Session {
    context: Arc<SessionContext>,
}

impl Session {
    /// Binds the local port and starts the four workers.
    ///
    /// # Errors
    ///
    /// Fails before any worker starts if a queue capacity is zero or the port
    /// cannot be bound. If a worker thread cannot be spawned, the ones already
    /// running are torn down before [`SessionError::Spawn`] is returned.
    pub fn start(config: &SessionConfig, io: SessionIo) -> Result<Self, SessionError> {
        Self::start_announced(config, io, |_| {})
    }

    /// Like [`start`](Self::start), but calls `announce` once the port is
    /// bound and before any worker runs, so nothing the session prints can
    /// come ahead of it.
    ///
    /// # Errors
    ///
    /// As for [`start`](Self::start). `announce` is not called when binding
    /// fails.
    pub fn start_announced(
        config: &SessionConfig,
        io: SessionIo,
        announce: impl FnOnce(&Console),
    ) -> Result<Self, SessionError> {
        if config.outbound_capacity == 0 || config.inbound_capacity == 0 {
            return Err(SessionError::ZeroCapacity);
        }
        info!(
            local_port = config.local_port,
            remote = %config.remote,
            outbound_capacity = config.outbound_capacity,
            inbound_capacity = config.inbound_capacity,
            "session starting"
        );

        let SessionIo {
            input,
            console,
            binder,
        } = io;

        let endpoint = Arc::new(SharedEndpoint::new(config.local_port, config.remote, binder));
        drop(endpoint.acquire()?);
        announce(&console);

        let outbound = Arc::new(BoundedQueue::<Message>::new(config.outbound_capacity));
        let inbound = Arc::new(BoundedQueue::<Message>::new(config.inbound_capacity));

        let roster = Arc::new(Roster {
            workers: Mutex::new(Vec::with_capacity(WORKER_COUNT)),
            endpoint: Arc::clone(&endpoint),
        });
        let context = Arc::new(SessionContext {
            readiness: Rendezvous::new(WORKER_COUNT),
            shutdown: ShutdownCoordinator::new(roster.clone()),
            console,
        });
        let session = Self { context };

        let input_stop = input.interrupter();
        session.spawn(
            &roster,
            WorkerRole::Input,
            move || input_stop.interrupt(),
            InputWorker::new(input, Arc::clone(&outbound)),
        )?;

        let display_stop = Arc::clone(&inbound);
        session.spawn(
            &roster,
            WorkerRole::Display,
            move || {
                display_stop.close();
                Ok(())
            },
            DisplayWorker::new(Arc::clone(&inbound)),
        )?;

        let transmitter_stop = Arc::clone(&outbound);
        session.spawn(
            &roster,
            WorkerRole::Transmitter,
            move || {
                transmitter_stop.close();
                Ok(())
            },
            TransmitterWorker::new(Arc::clone(&endpoint), outbound),
        )?;

        let receiver_stop = Arc::clone(&endpoint);
        session.spawn(
            &roster,
            WorkerRole::Receiver,
            move || receiver_stop.interrupt(),
            ReceiverWorker::new(endpoint, inbound),
        )?;

        info!("session started");
        Ok(session)
    }

    /// Spawns one worker thread and registers it for teardown.
    fn spawn(
        &self,
        roster: &Roster,
        role: WorkerRole,
        unblock: impl Fn() -> io::Result<()> + Send + Sync + 'static,
        mut worker: impl Worker,
    ) -> Result<(), SessionError> {
        let cancel = CancelToken::new();
        let context = Arc::clone(&self.context);

        debug!(%role, "spawning worker");
        let spawned: io::Result<JoinHandle<()>> = thread::Builder::new()
            .name(role.thread_name().into())
            .spawn({
                let cancel = cancel.clone();
                move || {
                    debug!("worker started");
                    worker.run(&cancel, &context);
                    debug!("worker exiting");
                }
            });

        match spawned {
            Ok(thread) => {
                roster.register(WorkerHandle::new(role, cancel, unblock, thread));
                Ok(())
            }
            Err(source) => {
                error!(%role, error = %source, "failed to spawn worker");
                self.context.readiness.abort();
                self.request_shutdown();
                // Whatever teardown finds is secondary to the spawn failure.
                let _ = self.context.shutdown.wait_for_completion();
                Err(SessionError::Spawn { role, source })
            }
        }
    }

    /// Ends the session from outside the workers. Idempotent.
    pub fn request_shutdown(&self) {
        self.context.shutdown.request_shutdown();
    }

    /// Console the session writes to.
    #[must_use]
    pub fn console(&self) -> &Console {
        &self.context.console
    }

    /// Blocks until the session has been torn down.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Shutdown`] if the teardown thread could not run
    /// to completion.
    pub fn wait_for_completion(self) -> Result<ShutdownReport, SessionError> {
        let report = self.context.shutdown.wait_for_completion()?;
        info!(clean = report.is_clean(), "session finished");
        Ok(report)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("shutdown", &self.context.shutdown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_order() {
        assert_eq!(
            WorkerRole::TEARDOWN_ORDER,
            [
                WorkerRole::Display,
                WorkerRole::Input,
                WorkerRole::Receiver,
                WorkerRole::Transmitter
            ]
        );
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.outbound_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.inbound_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected_before_bind() {
        struct NoBind;
        impl Bind for NoBind {
            fn bind(
                &self,
                _port: u16,
                _remote: SocketAddr,
            ) -> io::Result<Arc<dyn crate::net::Transport>> {
                panic!("must not bind");
            }
        }

        let config = SessionConfig {
            inbound_capacity: 0,
            ..SessionConfig::default()
        };
        let session_io = SessionIo {
            input: Box::new(StdinSource::new().unwrap()),
            console: Console::new(io::sink()),
            binder: Box::new(NoBind),
        };
        assert!(matches!(
            Session::start(&config, session_io),
            Err(SessionError::ZeroCapacity)
        ));
    }
}
