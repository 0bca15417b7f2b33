//! UDP transport on top of mio.
//!
//! The socket is non-blocking. The RX side parks in a [`mio::Poll`] that
//! watches both the socket and a [`mio::Waker`], so a receive blocked with no
//! traffic can still be woken at teardown. The TX side only ever waits when the
//! kernel send buffer is full, which it does with a plain `poll(2)`.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token, Waker};
use rustix::event::{PollFd, PollFlags};

use super::{Bind, Datagram, Transport};
use crate::sync::lock;
use crate::trace::{debug, trace};

const SOCKET: Token = Token(0);
const WAKER: Token = Token(1);

/// Receive-side readiness state. Only the RX thread polls.
struct RxPoll {
    poll: Poll,
    events: Events,
}

/// A UDP socket bound locally and aimed at a single peer.
pub struct UdpTransport {
    inner: MioUdpSocket,
    remote: SocketAddr,
    rx: Mutex<RxPoll>,
    waker: Waker,
}

impl UdpTransport {
    /// Binds a socket to `local` that sends to `remote`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound or registered.
    pub fn bind(local: SocketAddr, remote: SocketAddr) -> io::Result<Self> {
        let mut inner = MioUdpSocket::bind(local)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut inner, SOCKET, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        debug!(local = %local, remote = %remote, "UDP socket bound");
        Ok(Self {
            inner,
            remote,
            rx: Mutex::new(RxPoll {
                poll,
                events: Events::with_capacity(4),
            }),
            waker,
        })
    }

    /// Returns the local address this socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// The peer every datagram is sent to.
    #[must_use]
    pub const fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Blocks until the socket can take another datagram.
    fn wait_writable(&self) -> io::Result<()> {
        let mut fds = [PollFd::new(&self.inner, PollFlags::OUT)];
        loop {
            match rustix::event::poll(&mut fds, -1) {
                Ok(_) => return Ok(()),
                Err(rustix::io::Errno::INTR) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Transport for UdpTransport {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        loop {
            match self.inner.send_to(payload, self.remote) {
                Ok(n) => {
                    trace!(bytes = n, remote = %self.remote, "datagram sent");
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait_writable()?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Datagram> {
        let mut rx = lock(&self.rx);
        let RxPoll { poll, events } = &mut *rx;
        loop {
            // mio readiness is edge-triggered: drain before waiting again.
            match self.inner.recv_from(buf) {
                Ok((n, _from)) => {
                    trace!(bytes = n, from = %_from, "datagram received");
                    return Ok(Datagram::Received(n));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            match poll.poll(events, None) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            if events.iter().any(|event| event.token() == WAKER) {
                return Ok(Datagram::Interrupted);
            }
        }
    }

    fn interrupt(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

/// Binds [`UdpTransport`]s on `0.0.0.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpBinder;

impl Bind for UdpBinder {
    fn bind(&self, local_port: u16, remote: SocketAddr) -> io::Result<Arc<dyn Transport>> {
        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, local_port));
        Ok(Arc::new(UdpTransport::bind(local, remote)?))
    }
}
