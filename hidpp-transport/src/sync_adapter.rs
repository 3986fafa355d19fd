//! Synchronous convenience wrappers
//!
//! Worker threads that are not running inside a tokio runtime drive the
//! dispatcher through this thin blocking facade. It carries its own
//! current-thread runtime so queue timeouts have a timer to run on.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::dispatcher::{Dispatcher, InboundReport, QueueName};
use crate::error::TransportError;

/// Blocking view of a [`Dispatcher`].
pub struct SyncDispatcher {
    dispatcher: Arc<Dispatcher>,
    runtime: Runtime,
}

impl SyncDispatcher {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Result<Self, TransportError> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| TransportError::Internal(format!("runtime: {e}")))?;
        Ok(Self {
            dispatcher,
            runtime,
        })
    }

    /// Send a request and block for its correlated response.
    pub fn send(
        &self,
        report: Vec<u8>,
        response_queue: QueueName,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.runtime
            .block_on(self.dispatcher.send(report, response_queue, timeout))
    }

    /// Send without waiting for a response.
    pub fn send_no_wait(&self, report: Vec<u8>) -> Result<(), TransportError> {
        self.runtime.block_on(self.dispatcher.send_no_wait(report))
    }

    /// Block for the next report on a queue.
    pub fn get(
        &self,
        queue: QueueName,
        timeout: Duration,
    ) -> Result<InboundReport, TransportError> {
        self.runtime.block_on(self.dispatcher.get(queue, timeout))
    }

    /// Block for the first matching report on a queue.
    pub fn get_first_match(
        &self,
        queue: QueueName,
        pred: impl Fn(&InboundReport) -> bool,
        timeout: Duration,
    ) -> Result<InboundReport, TransportError> {
        self.runtime
            .block_on(self.dispatcher.get_first_match(queue, pred, timeout))
    }

    pub fn empty_queue(&self, queue: QueueName) {
        self.dispatcher.empty_queue(queue);
    }

    pub fn close(&self) {
        self.dispatcher.close();
    }
}
