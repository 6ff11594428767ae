//! A single connected viewer: its outbound video queue and subscription
//! set.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::config::VIEWER_QUEUE_DEPTH;

/// Bounded outbound queue with drop-oldest backpressure, a subscription
/// set, and a closed flag the writer task consults before every enqueue
/// attempt.
pub struct ViewerClient {
    pub id: String,
    queue: Mutex<VecDeque<Bytes>>,
    notify: Notify,
    closed: AtomicBool,
    subscriptions: Mutex<HashSet<String>>,
}

impl ViewerClient {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            queue: Mutex::new(VecDeque::with_capacity(VIEWER_QUEUE_DEPTH)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            subscriptions: Mutex::new(HashSet::new()),
        })
    }

    /// Drop-oldest enqueue. A no-op once closed.
    pub fn enqueue(&self, packet: Bytes) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut q = self.queue.lock();
            if q.len() >= VIEWER_QUEUE_DEPTH {
                q.pop_front();
            }
            q.push_back(packet);
        }
        self.notify.notify_one();
    }

    /// Waits for the next queued packet, or `None` once closed with an
    /// empty queue.
    pub async fn recv(&self) -> Option<Bytes> {
        loop {
            if let Some(packet) = self.queue.lock().pop_front() {
                return Some(packet);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, device_id: &str) {
        self.subscriptions.lock().insert(device_id.to_string());
    }

    pub fn unsubscribe(&self, device_id: &str) {
        self.subscriptions.lock().remove(device_id);
    }

    pub fn is_subscribed(&self, device_id: &str) -> bool {
        self.subscriptions.lock().contains(device_id)
    }

    /// Every device this client is currently subscribed to, used to issue
    /// one `RemoveViewer` per device on disconnect.
    pub fn subscribed_devices(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_oldest_keeps_newest_q_items() {
        let client = ViewerClient::new("c1");
        for i in 0..(VIEWER_QUEUE_DEPTH as u8 + 1) {
            client.enqueue(Bytes::from(vec![i]));
        }
        let mut received = Vec::new();
        while let Some(packet) = client.queue.lock().pop_front() {
            received.push(packet[0]);
        }
        assert_eq!(received.len(), VIEWER_QUEUE_DEPTH);
        // the oldest (0) was dropped; newest survive in order
        assert_eq!(received[0], 1);
        assert_eq!(*received.last().unwrap(), VIEWER_QUEUE_DEPTH as u8);
    }

    #[tokio::test]
    async fn closed_client_drops_further_enqueues() {
        let client = ViewerClient::new("c1");
        client.close();
        client.enqueue(Bytes::from_static(b"x"));
        assert!(client.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_wakes_on_enqueue() {
        let client = ViewerClient::new("c1");
        let client2 = client.clone();
        let handle = tokio::spawn(async move { client2.recv().await });
        tokio::task::yield_now().await;
        client.enqueue(Bytes::from_static(b"hello"));
        let received = handle.await.unwrap();
        assert_eq!(received.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn subscription_set_tracks_membership() {
        let client = ViewerClient::new("c1");
        assert!(!client.is_subscribed("dev_A"));
        client.subscribe("dev_A");
        assert!(client.is_subscribed("dev_A"));
        client.unsubscribe("dev_A");
        assert!(!client.is_subscribed("dev_A"));
    }
}
