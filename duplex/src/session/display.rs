//! Inbound queue → console.

use std::sync::Arc;

use super::{SessionContext, Worker, next_queued};
use crate::message::Message;
use crate::sync::cancel::CancelToken;
use crate::sync::queue::BoundedQueue;
use crate::trace::{debug, info, warn};

/// Prints received messages.
pub(crate) struct DisplayWorker {
    inbound: Arc<BoundedQueue<Message>>,
}

impl DisplayWorker {
    pub(crate) fn new(inbound: Arc<BoundedQueue<Message>>) -> Self {
        Self { inbound }
    }
}

impl Worker for DisplayWorker {
    fn run(&mut self, cancel: &CancelToken, context: &SessionContext) {
        if context.readiness.arrive().is_err() {
            debug!("readiness gate aborted");
            return;
        }

        // Only teardown closes the inbound queue.
        while let Some(message) = next_queued(&self.inbound, cancel) {
            let _region = cancel.defer();
            if message.is_empty() {
                continue;
            }

            if let Err(_e) = context.console.write_text(message.text()) {
                warn!(error = %_e, "failed to write message");
            }

            if message.is_termination() {
                info!("termination marker displayed");
                context.shutdown.request_shutdown();
                return;
            }
        }
        debug!("inbound queue drained");
    }
}
