//! Network transport for the session.
//!
//! - [`Transport`]: what the TX and RX threads need from a datagram socket.
//! - [`socket::UdpTransport`]: the mio-backed UDP implementation.
//! - [`endpoint::SharedEndpoint`]: the one transport both threads share,
//!   bound on first use and closed once at teardown.
//! - [`resolve_ipv4`]: host name lookup for the remote peer.

pub mod endpoint;
pub mod socket;

use std::io;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

pub use endpoint::{EndpointError, SharedEndpoint};
pub use socket::{UdpBinder, UdpTransport};

/// Outcome of a blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram {
    /// A datagram of this many bytes was written to the buffer.
    Received(usize),
    /// [`Transport::interrupt`] woke the receiver before anything arrived.
    Interrupted,
}

/// A datagram socket connected (logically) to one remote peer.
///
/// `send` and `recv` are called concurrently from different threads.
pub trait Transport: Send + Sync {
    /// Sends `payload` to the peer as one datagram.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the datagram could not be handed to the kernel.
    fn send(&self, payload: &[u8]) -> io::Result<usize>;

    /// Waits for the next datagram.
    ///
    /// # Errors
    ///
    /// Returns the OS error if receiving failed.
    fn recv(&self, buf: &mut [u8]) -> io::Result<Datagram>;

    /// Wakes a thread blocked in [`recv`](Self::recv), which then returns
    /// [`Datagram::Interrupted`].
    ///
    /// # Errors
    ///
    /// Returns an error if the wakeup could not be delivered.
    fn interrupt(&self) -> io::Result<()>;
}

/// Creates the session's transport.
pub trait Bind: Send + Sync {
    /// Binds `local_port` on all interfaces, sending to `remote`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket cannot be created or bound.
    fn bind(&self, local_port: u16, remote: SocketAddr) -> io::Result<Arc<dyn Transport>>;
}

/// Host name lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Name lookup itself failed.
    #[error("failed to look up {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },
    /// The host resolved, but only to non-IPv4 addresses.
    #[error("{host} has no IPv4 address")]
    NoIpv4 { host: String },
}

/// Resolves `host` (a name or dotted quad) to its first IPv4 address.
///
/// # Errors
///
/// Returns [`ResolveError`] if the lookup fails or yields no IPv4 address.
pub fn resolve_ipv4(host: &str, port: u16) -> Result<SocketAddr, ResolveError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ResolveError::Lookup {
            host: host.to_owned(),
            source,
        })?;

    addrs
        .into_iter()
        .find(|addr| matches!(addr.ip(), IpAddr::V4(_)))
        .ok_or_else(|| ResolveError::NoIpv4 {
            host: host.to_owned(),
        })
}
