//! The session's single shared network endpoint.
//!
//! Both the TX and RX threads need the same bound socket. Whichever asks first
//! binds it; later callers get the same handle. Teardown closes it exactly once,
//! after both threads have been joined.
//!
//! ```text
//!   Unbound ──acquire()──▶ Bound ──close()──▶ Closed
//!      └─────────────────close()─────────────────┘
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use super::{Bind, Transport};
use crate::sync::lock;
use crate::trace::{debug, info, warn};

/// Failure to obtain or release the shared endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// The local port could not be bound.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
    /// [`SharedEndpoint::close`] already ran.
    #[error("endpoint is already closed")]
    Closed,
    /// A thread that was never joined still holds the socket.
    #[error("endpoint still referenced by {holders} other handle(s)")]
    InUse { holders: usize },
}

/// What [`SharedEndpoint::close`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing was ever bound.
    NotCreated,
    /// The socket was released.
    Closed,
}

enum Slot {
    Unbound,
    Bound(Arc<dyn Transport>),
    Closed,
}

/// Lazily bound transport shared by the TX and RX threads.
pub struct SharedEndpoint {
    local_port: u16,
    remote: SocketAddr,
    binder: Box<dyn Bind>,
    slot: Mutex<Slot>,
}

impl SharedEndpoint {
    /// Creates an unbound endpoint. Nothing touches the network until
    /// [`acquire`](Self::acquire).
    #[must_use]
    pub fn new(local_port: u16, remote: SocketAddr, binder: Box<dyn Bind>) -> Self {
        Self {
            local_port,
            remote,
            binder,
            slot: Mutex::new(Slot::Unbound),
        }
    }

    /// Returns the shared transport, binding it on first use.
    ///
    /// The check and the bind happen under one lock, so concurrent first
    /// callers still bind only once.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Bind`] if binding fails (a later call may try
    /// again) or [`EndpointError::Closed`] after [`close`](Self::close).
    pub fn acquire(&self) -> Result<Arc<dyn Transport>, EndpointError> {
        let mut slot = lock(&self.slot);
        match &*slot {
            Slot::Bound(transport) => return Ok(Arc::clone(transport)),
            Slot::Closed => return Err(EndpointError::Closed),
            Slot::Unbound => {}
        }

        let transport = self
            .binder
            .bind(self.local_port, self.remote)
            .map_err(|source| {
                warn!(port = self.local_port, error = %source, "bind failed");
                EndpointError::Bind {
                    port: self.local_port,
                    source,
                }
            })?;
        info!(port = self.local_port, remote = %self.remote, "endpoint bound");
        *slot = Slot::Bound(Arc::clone(&transport));
        Ok(transport)
    }

    /// Returns `true` while a transport is bound.
    pub fn is_bound(&self) -> bool {
        matches!(*lock(&self.slot), Slot::Bound(_))
    }

    /// Wakes a thread blocked receiving on the transport. No-op if nothing is
    /// bound.
    ///
    /// # Errors
    ///
    /// Forwards the transport's error.
    pub fn interrupt(&self) -> io::Result<()> {
        let transport = match &*lock(&self.slot) {
            Slot::Bound(transport) => Arc::clone(transport),
            Slot::Unbound | Slot::Closed => return Ok(()),
        };
        transport.interrupt()
    }

    /// Releases the transport. Further [`acquire`](Self::acquire) calls fail.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Closed`] if already closed, or
    /// [`EndpointError::InUse`] if a thread that was never joined still holds
    /// the transport; the endpoint's own reference is dropped either way.
    pub fn close(&self) -> Result<CloseOutcome, EndpointError> {
        let previous = std::mem::replace(&mut *lock(&self.slot), Slot::Closed);
        match previous {
            Slot::Closed => Err(EndpointError::Closed),
            Slot::Unbound => Ok(CloseOutcome::NotCreated),
            Slot::Bound(transport) => {
                let holders = Arc::strong_count(&transport) - 1;
                drop(transport);
                if holders > 0 {
                    return Err(EndpointError::InUse { holders });
                }
                debug!(port = self.local_port, "endpoint closed");
                Ok(CloseOutcome::Closed)
            }
        }
    }

    /// Port the endpoint binds to.
    #[must_use]
    pub const fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Address every datagram is sent to.
    #[must_use]
    pub const fn remote(&self) -> SocketAddr {
        self.remote
    }
}
