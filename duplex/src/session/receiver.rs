//! Network → inbound queue.

use std::sync::Arc;

use super::{SessionContext, Worker};
use crate::message::{MAX_PAYLOAD, Message};
use crate::net::{Datagram, SharedEndpoint};
use crate::sync::cancel::CancelToken;
use crate::sync::queue::{BoundedQueue, Rejected};
use crate::trace::{debug, error, info, trace, warn};

/// Receives datagrams from the peer and queues them for display.
pub(crate) struct ReceiverWorker {
    endpoint: Arc<SharedEndpoint>,
    inbound: Arc<BoundedQueue<Message>>,
    buf: Vec<u8>,
}

impl ReceiverWorker {
    pub(crate) fn new(endpoint: Arc<SharedEndpoint>, inbound: Arc<BoundedQueue<Message>>) -> Self {
        Self {
            endpoint,
            inbound,
            buf: vec![0u8; MAX_PAYLOAD],
        }
    }
}

impl Worker for ReceiverWorker {
    fn run(&mut self, cancel: &CancelToken, context: &SessionContext) {
        if context.readiness.arrive().is_err() {
            debug!("readiness gate aborted");
            return;
        }

        let transport = match self.endpoint.acquire() {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "no endpoint to receive on");
                context.console.notice(format_args!("**Failed to open socket: {e}**"));
                context.shutdown.request_shutdown();
                return;
            }
        };

        while cancel.checkpoint().is_ok() {
            let len = match transport.recv(&mut self.buf) {
                Ok(Datagram::Received(len)) => len,
                Ok(Datagram::Interrupted) => continue,
                Err(_e) => {
                    error!(error = %_e, "receive failed");
                    context.console.notice("**Error receiving message**");
                    context.shutdown.request_shutdown();
                    return;
                }
            };

            let _region = cancel.defer();
            let message = Message::from_chunk(&self.buf[..len]);
            if message.is_empty() {
                continue;
            }
            let terminates = message.is_termination();
            trace!(bytes = message.text().len(), terminates, "message received");

            match self.inbound.enqueue(message) {
                Ok(()) => {}
                Err(Rejected::Full(_dropped)) => {
                    warn!(capacity = self.inbound.capacity(), "inbound queue full");
                    context
                        .console
                        .notice("**The receiving message queue is too large!**");
                    context.console.notice(
                        "**The most recent message will be dropped, please tell the other to resend**",
                    );
                    // Display will never see this marker.
                    if terminates {
                        context.shutdown.request_shutdown();
                    }
                }
                Err(Rejected::Closed(_)) => {
                    debug!("inbound queue closed");
                    return;
                }
            }

            if terminates {
                info!("peer ended the session");
                return;
            }
        }
    }
}
