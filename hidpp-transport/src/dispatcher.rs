//! Thread-safe transport demultiplexer.
//!
//! One reader thread per physical transport drains inbound frames and
//! classifies them into named queues; any number of caller tasks invoke
//! `send`, `get` and `get_first_match` concurrently. A per-device async
//! mutex keeps at most one outstanding request per device index, which
//! matches the firmware's rejection of concurrent requests with BUSY.
//!
//! Correlation uses the `(feature_index, function_index)` header pair.
//! The software-id nibble is a caller tag only; devices do not reliably
//! echo it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use hidpp_protocol::message::{subid, ErrorReport, Header, ReportId};

use crate::error::TransportError;
use crate::queue::FilterQueue;

/// Poll granularity of the reader thread.
const READ_POLL: Duration = Duration::from_millis(10);

/// A raw report channel under the dispatcher.
///
/// `read_report` blocks up to its timeout and is only ever called from
/// the dispatcher's reader thread; writes may come from any task.
#[async_trait]
pub trait RawChannel: Send + Sync {
    async fn write_report(&self, data: &[u8]) -> Result<(), TransportError>;

    /// `Ok(None)` on timeout; `Err(TransportLost)` when the transport
    /// goes away.
    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;

    fn close(&self);
}

/// Logical destinations for inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// Protocol-critical features (0x0000..=0x0FFF).
    Important,
    Common,
    Mouse,
    Keyboard,
    Touchpad,
    Gaming,
    Event,
    Error,
    /// Non-HID++ reports, keyed by report id inside the queue.
    Hid,
    ReceiverResponse,
    ReceiverEvent,
}

const ALL_QUEUES: [QueueName; 11] = [
    QueueName::Important,
    QueueName::Common,
    QueueName::Mouse,
    QueueName::Keyboard,
    QueueName::Touchpad,
    QueueName::Gaming,
    QueueName::Event,
    QueueName::Error,
    QueueName::Hid,
    QueueName::ReceiverResponse,
    QueueName::ReceiverEvent,
];

/// Map a feature id to its response queue.
fn queue_for_feature(feature_id: u16) -> QueueName {
    match feature_id {
        0x0000..=0x0FFF => QueueName::Important,
        0x1000..=0x1FFF => QueueName::Common,
        0x2000..=0x2FFF => QueueName::Mouse,
        0x4000..=0x4FFF => QueueName::Keyboard,
        0x6000..=0x6FFF => QueueName::Touchpad,
        0x8000..=0x8FFF => QueueName::Gaming,
        _ => QueueName::Common,
    }
}

/// One inbound frame plus its pre-parsed header, when HID++-shaped.
#[derive(Debug, Clone)]
pub struct InboundReport {
    pub data: Vec<u8>,
    pub header: Option<Header>,
}

impl InboundReport {
    fn new(data: Vec<u8>) -> Self {
        let header = Header::parse(&data).ok();
        Self { data, header }
    }

    pub fn matches_response(&self, feature_index: u8, function_index: u8) -> bool {
        match self.header {
            Some(h) => {
                h.feature_index == feature_index
                    && h.function_index == function_index
                    && !ErrorReport::is_error_report(&self.data)
            }
            None => false,
        }
    }

    pub fn matches_error(&self, feature_index: u8, function_index: u8) -> bool {
        match ErrorReport::parse(&self.data) {
            Ok(err) => err.feature_index == feature_index && err.function_index == function_index,
            Err(_) => false,
        }
    }
}

/// Routing facts learned per `(device_index, feature_index)` when the
/// channel layer resolves features.
#[derive(Debug, Clone, Copy)]
struct FeatureRoute {
    feature_id: u16,
    max_function_index: u8,
}

pub struct Dispatcher {
    channel: Arc<dyn RawChannel>,
    queues: HashMap<QueueName, Arc<FilterQueue<InboundReport>>>,
    device_locks: Mutex<HashMap<u8, Arc<AsyncMutex<()>>>>,
    routes: RwLock<HashMap<(u8, u8), FeatureRoute>>,
    shutdown: Arc<AtomicBool>,
    reader: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Dispatcher {
    /// Wrap a channel and start its reader thread.
    pub fn new(channel: Arc<dyn RawChannel>) -> Result<Arc<Self>, TransportError> {
        let mut queues = HashMap::new();
        for name in ALL_QUEUES {
            queues.insert(name, Arc::new(FilterQueue::new()));
        }
        let dispatcher = Arc::new(Self {
            channel,
            queues,
            device_locks: Mutex::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            reader: Mutex::new(None),
        });
        let this = dispatcher.clone();
        let handle = std::thread::Builder::new()
            .name("hidpp-reader".into())
            .spawn(move || this.reader_loop())
            .map_err(|e| TransportError::Internal(format!("reader thread: {e}")))?;
        *dispatcher.reader.lock() = Some(handle);
        Ok(dispatcher)
    }

    /// Record a resolved feature so inbound frames from it classify to
    /// the right queue and events are recognized.
    pub fn register_feature(
        &self,
        device_index: u8,
        feature_index: u8,
        feature_id: u16,
        max_function_index: u8,
    ) {
        self.routes.write().insert(
            (device_index, feature_index),
            FeatureRoute {
                feature_id,
                max_function_index,
            },
        );
    }

    pub fn queue(&self, name: QueueName) -> Arc<FilterQueue<InboundReport>> {
        // all queues exist from construction
        self.queues[&name].clone()
    }

    fn device_lock(&self, device_index: u8) -> Arc<AsyncMutex<()>> {
        self.device_locks
            .lock()
            .entry(device_index)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Write a request and wait for its correlated response.
    ///
    /// Holds the per-device mutex from the write until the response,
    /// error, or timeout; the mutex is released on every exit path.
    pub async fn send(
        &self,
        report: Vec<u8>,
        response_queue: QueueName,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let header = Header::parse(&report)?;
        let lock = self.device_lock(header.device_index);
        let _guard = lock.lock().await;
        self.channel.write_report(&report).await?;

        let feature_index = header.feature_index;
        let function_index = header.function_index;
        let response = self.queue(response_queue);
        let errors = self.queue(QueueName::Error);
        tokio::select! {
            rsp = response
                .get_first_match(move |r| r.matches_response(feature_index, function_index), timeout) => {
                rsp.map(|r| r.data)
            }
            err = errors
                .get_first_match(move |r| r.matches_error(feature_index, function_index), timeout) => {
                let report = ErrorReport::parse(&err?.data)?;
                Err(TransportError::Device {
                    error_code: report.error_code,
                    feature_index: report.feature_index,
                    function_index: report.function_index,
                })
            }
        }
    }

    /// Write without waiting for any response.
    pub async fn send_no_wait(&self, report: Vec<u8>) -> Result<(), TransportError> {
        let header = Header::parse(&report)?;
        let lock = self.device_lock(header.device_index);
        let _guard = lock.lock().await;
        self.channel.write_report(&report).await
    }

    pub async fn get(
        &self,
        name: QueueName,
        timeout: Duration,
    ) -> Result<InboundReport, TransportError> {
        self.queue(name).get(timeout).await
    }

    pub async fn get_first_match(
        &self,
        name: QueueName,
        pred: impl Fn(&InboundReport) -> bool,
        timeout: Duration,
    ) -> Result<InboundReport, TransportError> {
        self.queue(name).get_first_match(pred, timeout).await
    }

    /// Discard everything pending in one queue.
    pub fn empty_queue(&self, name: QueueName) {
        self.queue(name).clear();
    }

    /// Stop the reader and cancel every pending get.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.channel.close();
        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
        self.close_queues();
    }

    fn close_queues(&self) {
        for queue in self.queues.values() {
            queue.close();
        }
    }

    fn reader_loop(&self) {
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.channel.read_report(READ_POLL) {
                Ok(Some(frame)) => {
                    let name = self.classify(&frame);
                    debug!(queue = ?name, len = frame.len(), "inbound frame");
                    self.queues[&name].push(InboundReport::new(frame));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "reader stopping, cancelling pending gets");
                    self.close_queues();
                    return;
                }
            }
        }
    }

    fn classify(&self, frame: &[u8]) -> QueueName {
        let Some(first) = frame.first() else {
            return QueueName::Hid;
        };
        if ReportId::from_value(*first).is_none() {
            return QueueName::Hid;
        }
        if ErrorReport::is_error_report(frame) {
            return QueueName::Error;
        }
        // HID++ 1.0 receiver traffic rides short reports with a sub-id
        // where HID++ 2.0 carries the feature index
        if *first == ReportId::Short.value()
            && frame.len() >= 3
            && subid::is_receiver_notification(frame[2])
        {
            return if frame[2] == subid::ERROR_MESSAGE {
                QueueName::ReceiverResponse
            } else {
                QueueName::ReceiverEvent
            };
        }
        let Ok(header) = Header::parse(frame) else {
            return QueueName::Hid;
        };
        // root and the feature set always sit at indexes 0 and 1
        if header.feature_index <= 0x01 {
            return QueueName::Important;
        }
        let route = self
            .routes
            .read()
            .get(&(header.device_index, header.feature_index))
            .copied();
        if let Some(route) = route {
            // events use software id 0 and sit above the function range
            if header.software_id == 0 && header.function_index > route.max_function_index {
                return QueueName::Event;
            }
            return queue_for_feature(route.feature_id);
        }
        QueueName::Common
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
