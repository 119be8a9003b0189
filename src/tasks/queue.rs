use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("delivery queue is full (capacity {capacity})")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Bounded FIFO hand-off buffer between the feed scanner and the delivery
/// worker. The capacity bound keeps memory flat if the delivery side stalls
/// during an extended platform outage.
#[derive(Debug)]
pub struct DeliveryQueue<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    capacity: usize,
}

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> DeliveryQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Appends an item; rejects with `QueueFull` at capacity and after close.
    pub fn push(&self, value: T) -> Result<(), QueueFull> {
        {
            let mut inner = self.inner.lock();
            if inner.closed || inner.items.len() >= self.capacity {
                return Err(QueueFull {
                    capacity: self.capacity,
                });
            }
            inner.items.push_back(value);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Re-inserts a retried item ahead of the remaining cohort so it is not
    /// overtaken by items fetched later. Exempt from the capacity bound; the
    /// item already held its slot.
    pub fn push_front(&self, value: T) {
        self.inner.lock().items.push_front(value);
        self.notify.notify_one();
    }

    /// Waits until an item is available. Returns `None` once the queue has
    /// been closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops further pushes and wakes every pending `pop`.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn pop_preserves_push_order() {
        let queue = DeliveryQueue::new(8);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();
        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn requeued_item_is_not_overtaken() {
        let queue = DeliveryQueue::new(8);
        queue.push("i1").unwrap();
        queue.push("i2").unwrap();
        queue.push("i3").unwrap();

        // i1 fails mid-delivery and is requeued at the front
        let retried = queue.pop().await.unwrap();
        queue.push_front(retried);

        assert_eq!(queue.pop().await, Some("i1"));
        assert_eq!(queue.pop().await, Some("i2"));
        assert_eq!(queue.pop().await, Some("i3"));
    }

    #[test]
    fn push_fails_at_capacity() {
        let queue = DeliveryQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn push_front_bypasses_capacity() {
        let queue = DeliveryQueue::new(1);
        queue.push(1).unwrap();
        queue.push_front(0);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn pop_returns_none_after_close() {
        let queue: DeliveryQueue<u8> = DeliveryQueue::new(4);
        queue.close();
        assert_eq!(queue.pop().await, None);
        assert!(queue.push(1).is_err());
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(DeliveryQueue::new(4));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(42).unwrap();
        let popped = tokio::time::timeout(Duration::from_secs(1), popper)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, Some(42));
    }

    #[tokio::test]
    async fn close_wakes_pending_pop() {
        let queue: Arc<DeliveryQueue<u8>> = Arc::new(DeliveryQueue::new(4));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();
        let popped = tokio::time::timeout(Duration::from_secs(1), popper)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, None);
    }
}
