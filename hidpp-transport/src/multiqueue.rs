//! Receiver-side demultiplexer.
//!
//! A wireless receiver tunnels several logical devices over one
//! transport. The `MultiQueue` splits inbound frames into a dedicated
//! transceiver queue, dynamically-added per-device queues, and a dump
//! queue for frames addressed to unknown devices. A merged `get` view
//! restores global FIFO order across the inner queues using the arrival
//! tickets assigned on push.
//!
//! HID++ 1.0 receiver notifications (connection, disconnection,
//! discovery, pairing status, error) are always forced to the
//! transceiver queue no matter which device index the frame carries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout_at;
use tracing::debug;

use hidpp_protocol::message::{subid, ReportId, TRANSCEIVER_DEVICE_INDEX};

use crate::error::TransportError;
use crate::queue::{next_ticket, FilterQueue};

pub struct MultiQueue {
    transceiver: Arc<FilterQueue<Vec<u8>>>,
    dump: Arc<FilterQueue<Vec<u8>>>,
    devices: Mutex<HashMap<u8, Arc<FilterQueue<Vec<u8>>>>>,
    notify: Notify,
}

impl Default for MultiQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiQueue {
    pub fn new() -> Self {
        Self {
            transceiver: Arc::new(FilterQueue::new()),
            dump: Arc::new(FilterQueue::new()),
            devices: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Install a per-device queue. Frames for this index stop falling
    /// into the dump queue.
    pub fn add_device(&self, device_index: u8) -> Arc<FilterQueue<Vec<u8>>> {
        let mut devices = self.devices.lock();
        devices
            .entry(device_index)
            .or_insert_with(|| Arc::new(FilterQueue::new()))
            .clone()
    }

    /// Remove a per-device queue, closing it so pending gets cancel.
    pub fn remove_device(&self, device_index: u8) {
        if let Some(queue) = self.devices.lock().remove(&device_index) {
            queue.close();
        }
        self.notify.notify_waiters();
    }

    pub fn transceiver_queue(&self) -> Arc<FilterQueue<Vec<u8>>> {
        self.transceiver.clone()
    }

    pub fn dump_queue(&self) -> Arc<FilterQueue<Vec<u8>>> {
        self.dump.clone()
    }

    pub fn device_queue(&self, device_index: u8) -> Option<Arc<FilterQueue<Vec<u8>>>> {
        self.devices.lock().get(&device_index).cloned()
    }

    /// True when the frame is an HID++ 1.0 receiver notification.
    fn is_receiver_notification(frame: &[u8]) -> bool {
        frame.first() == Some(&ReportId::Short.value())
            && frame.len() >= 3
            && subid::is_receiver_notification(frame[2])
    }

    /// Route one inbound frame to its inner queue.
    pub fn push(&self, frame: Vec<u8>) {
        let ticket = next_ticket();
        let target = if Self::is_receiver_notification(&frame) {
            self.transceiver.clone()
        } else {
            match frame.get(1) {
                Some(&TRANSCEIVER_DEVICE_INDEX) => self.transceiver.clone(),
                Some(idx) => match self.devices.lock().get(idx) {
                    Some(queue) => queue.clone(),
                    None => {
                        debug!(device_index = idx, "frame for unknown device, dumping");
                        self.dump.clone()
                    }
                },
                None => self.dump.clone(),
            }
        };
        target.push_ticketed(ticket, frame);
        self.notify.notify_waiters();
    }

    /// Pop the globally-oldest frame across every inner queue.
    pub async fn get(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.try_pop_merged() {
                return Ok(frame);
            }
            if self.transceiver.is_closed() {
                return Err(TransportError::Cancelled);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Err(TransportError::Timeout);
            }
        }
    }

    fn try_pop_merged(&self) -> Option<Vec<u8>> {
        let mut best: Option<(u64, Arc<FilterQueue<Vec<u8>>>)> = None;
        let mut consider = |queue: &Arc<FilterQueue<Vec<u8>>>| {
            if let Some(ticket) = queue.front_ticket() {
                if best.as_ref().is_none_or(|(t, _)| ticket < *t) {
                    best = Some((ticket, queue.clone()));
                }
            }
        };
        consider(&self.transceiver);
        consider(&self.dump);
        for queue in self.devices.lock().values() {
            consider(queue);
        }
        best.and_then(|(_, queue)| queue.try_pop())
    }

    /// Close every inner queue.
    pub fn close(&self) {
        self.transceiver.close();
        self.dump.close();
        for queue in self.devices.lock().values() {
            queue.close();
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_frame(device_index: u8, sub_id: u8) -> Vec<u8> {
        vec![0x10, device_index, sub_id, 0, 0, 0, 0]
    }

    #[tokio::test]
    async fn per_device_routing() {
        let mq = MultiQueue::new();
        let q1 = mq.add_device(1);
        mq.push(short_frame(1, 0x00));
        mq.push(short_frame(2, 0x00)); // no queue for device 2
        assert_eq!(q1.len(), 1);
        assert_eq!(mq.dump_queue().len(), 1);
    }

    #[tokio::test]
    async fn receiver_notifications_forced_to_transceiver() {
        let mq = MultiQueue::new();
        let q1 = mq.add_device(1);
        // connection notification carries a paired-device index, not 0xFF
        mq.push(short_frame(1, subid::DEVICE_CONNECTION));
        mq.push(short_frame(1, subid::ERROR_MESSAGE));
        assert_eq!(q1.len(), 0);
        assert_eq!(mq.transceiver_queue().len(), 2);
    }

    #[tokio::test]
    async fn transceiver_index_routes_to_transceiver() {
        let mq = MultiQueue::new();
        mq.push(short_frame(TRANSCEIVER_DEVICE_INDEX, 0x00));
        assert_eq!(mq.transceiver_queue().len(), 1);
    }

    #[tokio::test]
    async fn merged_get_restores_arrival_order() {
        let mq = MultiQueue::new();
        mq.add_device(1);
        mq.add_device(2);
        mq.push(short_frame(1, 0x10));
        mq.push(short_frame(2, 0x11));
        mq.push(short_frame(TRANSCEIVER_DEVICE_INDEX, 0x12));
        mq.push(short_frame(1, 0x13));
        let mut subs = Vec::new();
        for _ in 0..4 {
            subs.push(mq.get(Duration::from_millis(10)).await.unwrap()[2]);
        }
        assert_eq!(subs, vec![0x10, 0x11, 0x12, 0x13]);
        assert!(matches!(
            mq.get(Duration::from_millis(10)).await,
            Err(TransportError::Timeout)
        ));
    }

    #[tokio::test]
    async fn close_cancels_merged_get() {
        let mq = Arc::new(MultiQueue::new());
        let mq2 = mq.clone();
        let waiter = tokio::spawn(async move { mq2.get(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        mq.close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(TransportError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn removed_device_frames_fall_to_dump() {
        let mq = MultiQueue::new();
        mq.add_device(3);
        mq.remove_device(3);
        mq.push(short_frame(3, 0x00));
        assert_eq!(mq.dump_queue().len(), 1);
    }
}
