//! Keyboard → outbound queue.

use std::sync::Arc;

use super::{SessionContext, Worker};
use crate::message::{MAX_PAYLOAD, Message};
use crate::stdio::{Chunk, InputSource};
use crate::sync::cancel::CancelToken;
use crate::sync::queue::{BoundedQueue, Rejected};
use crate::trace::{debug, info, trace, warn};

/// Reads chunks of typed text and queues them for the transmitter.
pub(crate) struct InputWorker {
    source: Box<dyn InputSource>,
    outbound: Arc<BoundedQueue<Message>>,
    buf: Vec<u8>,
}

impl InputWorker {
    pub(crate) fn new(source: Box<dyn InputSource>, outbound: Arc<BoundedQueue<Message>>) -> Self {
        Self {
            source,
            outbound,
            buf: vec![0u8; MAX_PAYLOAD],
        }
    }
}

impl Worker for InputWorker {
    fn run(&mut self, cancel: &CancelToken, context: &SessionContext) {
        if context.readiness.arrive().is_err() {
            debug!("readiness gate aborted");
            return;
        }

        while cancel.checkpoint().is_ok() {
            let len = match self.source.read_chunk(&mut self.buf) {
                Ok(Chunk::Data(len)) => len,
                Ok(Chunk::Interrupted) => continue,
                Ok(Chunk::Eof) => {
                    info!("end of input");
                    context.shutdown.request_shutdown();
                    return;
                }
                Err(_e) => {
                    warn!(error = %_e, "input read failed");
                    context.shutdown.request_shutdown();
                    return;
                }
            };

            let _region = cancel.defer();
            let message = Message::from_chunk(&self.buf[..len]);
            let terminates = message.is_termination();
            trace!(bytes = message.text().len(), terminates, "input chunk");

            match self.outbound.enqueue(message) {
                Ok(()) => {}
                Err(Rejected::Full(_dropped)) => {
                    warn!(capacity = self.outbound.capacity(), "outbound queue full");
                    context
                        .console
                        .notice("**The sending message queue is too large!**");
                    context.console.notice(
                        "**Your most recent message will be dropped, please try resending**",
                    );
                    // The peer will never see this marker.
                    if terminates {
                        context.shutdown.request_shutdown();
                    }
                }
                Err(Rejected::Closed(_)) => {
                    debug!("outbound queue closed");
                    return;
                }
            }

            if terminates {
                info!("termination marker typed");
                return;
            }
        }
    }
}
