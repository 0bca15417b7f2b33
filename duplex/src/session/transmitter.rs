//! Outbound queue → network.

use std::sync::Arc;

use super::{SessionContext, Worker, next_queued};
use crate::message::Message;
use crate::net::SharedEndpoint;
use crate::sync::cancel::CancelToken;
use crate::sync::queue::BoundedQueue;
use crate::trace::{debug, error, info, trace, warn};

/// Sends queued messages to the peer, one datagram each.
pub(crate) struct TransmitterWorker {
    endpoint: Arc<SharedEndpoint>,
    outbound: Arc<BoundedQueue<Message>>,
}

impl TransmitterWorker {
    pub(crate) fn new(endpoint: Arc<SharedEndpoint>, outbound: Arc<BoundedQueue<Message>>) -> Self {
        Self { endpoint, outbound }
    }
}

impl Worker for TransmitterWorker {
    fn run(&mut self, cancel: &CancelToken, context: &SessionContext) {
        if context.readiness.arrive().is_err() {
            debug!("readiness gate aborted");
            return;
        }

        let transport = match self.endpoint.acquire() {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "no endpoint to send on");
                context.console.notice(format_args!("**Failed to open socket: {e}**"));
                context.shutdown.request_shutdown();
                return;
            }
        };

        while let Some(message) = next_queued(&self.outbound, cancel) {
            let _region = cancel.defer();
            if message.is_empty() {
                continue;
            }

            match transport.send(message.wire_bytes()) {
                Ok(_sent) => {
                    trace!(bytes = _sent, "message sent");
                }
                Err(_e) => {
                    warn!(error = %_e, "send failed");
                    context.console.notice("**Error sending message**");
                }
            }

            if message.is_termination() {
                info!("termination marker sent");
                context.shutdown.request_shutdown();
                return;
            }
        }

        debug!("outbound queue drained");
        context.shutdown.request_shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::endpoint::CloseOutcome;
    use crate::net::{Bind, Datagram, Transport};
    use crate::session::shutdown::{ShutdownCoordinator, ShutdownReport, Teardown};
    use crate::stdio::Console;
    use crate::sync::gate::Rendezvous;
    use crate::sync::lock;
    use std::io;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Vec<u8>>>,
        fail_first: Mutex<bool>,
    }

    impl Transport for Recording {
        fn send(&self, payload: &[u8]) -> io::Result<usize> {
            if std::mem::take(&mut *lock(&self.fail_first)) {
                return Err(io::Error::other("network unreachable"));
            }
            lock(&self.sent).push(payload.to_vec());
            Ok(payload.len())
        }

        fn recv(&self, _buf: &mut [u8]) -> io::Result<Datagram> {
            Ok(Datagram::Interrupted)
        }

        fn interrupt(&self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Fixed(Arc<Recording>);

    impl Bind for Fixed {
        fn bind(&self, _port: u16, _remote: SocketAddr) -> io::Result<Arc<dyn Transport>> {
            Ok(self.0.clone())
        }
    }

    struct Noop;

    impl Teardown for Noop {
        fn teardown(&self) -> ShutdownReport {
            ShutdownReport {
                workers: Vec::new(),
                endpoint: Ok(CloseOutcome::NotCreated),
            }
        }
    }

    fn setup(fail_first: bool) -> (Arc<Recording>, TransmitterWorker, Arc<BoundedQueue<Message>>) {
        let transport = Arc::new(Recording {
            fail_first: Mutex::new(fail_first),
            ..Recording::default()
        });
        let remote = SocketAddr::from((Ipv4Addr::LOCALHOST, 9002));
        let endpoint = Arc::new(SharedEndpoint::new(
            9001,
            remote,
            Box::new(Fixed(Arc::clone(&transport))),
        ));
        let outbound = Arc::new(BoundedQueue::new(8));
        let worker = TransmitterWorker::new(endpoint, Arc::clone(&outbound));
        (transport, worker, outbound)
    }

    fn context() -> SessionContext {
        SessionContext {
            readiness: Rendezvous::new(1),
            shutdown: ShutdownCoordinator::new(Arc::new(Noop)),
            console: Console::new(io::sink()),
        }
    }

    #[test]
    fn test_sends_until_marker() {
        let (transport, mut worker, outbound) = setup(false);
        outbound.enqueue(Message::from_chunk(b"hello\n")).unwrap();
        outbound.enqueue(Message::from_chunk(b"!\n")).unwrap();
        outbound.enqueue(Message::from_chunk(b"after\n")).unwrap();

        let context = context();
        worker.run(&CancelToken::new(), &context);

        assert_eq!(
            *lock(&transport.sent),
            vec![b"hello\n".to_vec(), b"!\n".to_vec()]
        );
        assert!(context.shutdown.is_requested());
        assert_eq!(outbound.len(), 1);
        context.shutdown.wait_for_completion().unwrap();
    }

    #[test]
    fn test_send_failure_is_not_fatal() {
        let (transport, mut worker, outbound) = setup(true);
        outbound.enqueue(Message::from_chunk(b"lost\n")).unwrap();
        outbound.enqueue(Message::from_chunk(b"kept\n!\n")).unwrap();

        let context = context();
        worker.run(&CancelToken::new(), &context);

        assert_eq!(*lock(&transport.sent), vec![b"kept\n!\n".to_vec()]);
        context.shutdown.wait_for_completion().unwrap();
    }

    #[test]
    fn test_teardown_still_sends_accepted_messages() {
        let (transport, mut worker, outbound) = setup(false);
        for line in ["one\n", "two\n", "three\n"] {
            outbound.enqueue(Message::from_chunk(line.as_bytes())).unwrap();
        }
        let cancel = CancelToken::new();
        cancel.cancel();
        outbound.close();

        let context = context();
        worker.run(&cancel, &context);

        assert_eq!(
            *lock(&transport.sent),
            vec![b"one\n".to_vec(), b"two\n".to_vec(), b"three\n".to_vec()]
        );
        assert!(outbound.is_empty());
        context.shutdown.wait_for_completion().unwrap();
    }

    #[test]
    fn test_closed_queue_stops_worker() {
        let (transport, mut worker, outbound) = setup(false);
        let context = Arc::new(context());

        let running = {
            let context = Arc::clone(&context);
            thread::spawn(move || worker.run(&CancelToken::new(), &context))
        };
        outbound.close();
        running.join().unwrap();

        assert!(lock(&transport.sent).is_empty());
        assert!(context.shutdown.is_requested());
        context.shutdown.wait_for_completion().unwrap();
    }
}
