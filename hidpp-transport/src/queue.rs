//! Filtered FIFO queues feeding the dispatcher's consumers.
//!
//! A `FilterQueue` preserves arrival order and lets a consumer remove
//! the first item matching a predicate, waiting up to a timeout. Every
//! enqueued item carries a ticket from a process-wide arrival counter so
//! that merged views across queues can restore global FIFO order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::timeout_at;

use crate::error::TransportError;

static ARRIVAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Take the next global arrival ticket.
pub(crate) fn next_ticket() -> u64 {
    ARRIVAL_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct Inner<T> {
    items: VecDeque<(u64, T)>,
    closed: bool,
}

/// An unbounded FIFO with predicate-filtered removal.
pub struct FilterQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
}

impl<T> Default for FilterQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FilterQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue with a fresh arrival ticket. Items pushed after close are
    /// dropped.
    pub fn push(&self, item: T) {
        self.push_ticketed(next_ticket(), item);
    }

    /// Enqueue with a caller-supplied ticket (used by merged views).
    pub(crate) fn push_ticketed(&self, ticket: u64, item: T) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.items.push_back((ticket, item));
        }
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Discard all pending items.
    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }

    /// Close the queue. All pending and future gets return `Cancelled`.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Ticket of the oldest pending item.
    pub(crate) fn front_ticket(&self) -> Option<u64> {
        self.inner.lock().items.front().map(|(t, _)| *t)
    }

    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front().map(|(_, item)| item)
    }

    /// Remove the first item matching `pred` without waiting.
    pub fn try_pop_match(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let mut inner = self.inner.lock();
        let pos = inner.items.iter().position(|(_, item)| pred(item))?;
        inner.items.remove(pos).map(|(_, item)| item)
    }

    /// Pop the oldest item, waiting up to `timeout`.
    pub async fn get(&self, timeout: Duration) -> Result<T, TransportError> {
        self.get_first_match(|_| true, timeout).await
    }

    /// Atomically scan in arrival order and remove the first item
    /// matching `pred`; wait up to `timeout` for one to arrive.
    pub async fn get_first_match(
        &self,
        pred: impl Fn(&T) -> bool,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // register for wakeup before the check to avoid a lost
            // notification between unlock and await
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(pos) = inner.items.iter().position(|(_, item)| pred(item)) {
                    if let Some((_, item)) = inner.items.remove(pos) {
                        return Ok(item);
                    }
                }
                if inner.closed {
                    return Err(TransportError::Cancelled);
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Err(TransportError::Timeout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let q = FilterQueue::new();
        q.push(1u32);
        q.push(2);
        q.push(3);
        assert_eq!(q.get(Duration::from_millis(10)).await.unwrap(), 1);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn filtered_removal_keeps_others() {
        let q = FilterQueue::new();
        q.push(10u32);
        q.push(11);
        q.push(12);
        let item = q
            .get_first_match(|v| *v % 2 == 1, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(item, 11);
        assert_eq!(q.try_pop(), Some(10));
        assert_eq!(q.try_pop(), Some(12));
    }

    #[tokio::test]
    async fn waiter_sees_later_push() {
        let q = Arc::new(FilterQueue::new());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move {
            q2.get_first_match(|v| *v == 7u32, Duration::from_secs(1)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(3);
        q.push(7);
        assert_eq!(waiter.await.unwrap().unwrap(), 7);
        // the non-matching item stays queued
        assert_eq!(q.try_pop(), Some(3));
    }

    #[tokio::test]
    async fn timeout_when_nothing_matches() {
        let q: FilterQueue<u32> = FilterQueue::new();
        q.push(1);
        let err = q
            .get_first_match(|v| *v == 99, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }

    #[tokio::test]
    async fn close_cancels_pending_get() {
        let q: Arc<FilterQueue<u32>> = Arc::new(FilterQueue::new());
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.get(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.close();
        assert!(matches!(
            waiter.await.unwrap(),
            Err(TransportError::Cancelled)
        ));
        // pushes after close are dropped
        q.push(1);
        assert!(q.is_empty());
    }
}
