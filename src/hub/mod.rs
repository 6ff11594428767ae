//! Viewer Hub: one process-wide registry of connected WebSocket clients,
//! their subscriptions, and per-device fan-out.

pub mod client;
pub mod protocol;

pub use client::ViewerClient;
pub use protocol::{encode_video_packet, ClientMessage};

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

/// A single mutex (via `parking_lot::RwLock`) guards the client-set; every
/// client's own queue and subscription set have their own interior
/// mutability, so a broadcast only needs a read lock on the registry
/// itself and does non-blocking enqueues.
#[derive(Default)]
pub struct ViewerHub {
    clients: RwLock<HashMap<String, Arc<ViewerClient>>>,
}

impl ViewerHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, client: Arc<ViewerClient>) {
        self.clients.write().insert(client.id.clone(), client);
    }

    /// Removes and returns the client so the caller can walk its
    /// subscription set and issue `RemoveViewer` per device.
    pub fn unregister(&self, client_id: &str) -> Option<Arc<ViewerClient>> {
        self.clients.write().remove(client_id)
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<ViewerClient>> {
        self.clients.read().get(client_id).cloned()
    }

    /// Enqueues `packet` on every client subscribed to `device_id`. No
    /// packet bytes are copied beyond the cheap `Bytes` refcount bump.
    pub fn broadcast_to_device(&self, device_id: &str, packet: Bytes) {
        for client in self.clients.read().values() {
            if client.is_subscribed(device_id) {
                client.enqueue(packet.clone());
            }
        }
    }

    /// Enqueues `packet` to exactly one client, used for primer replay on
    /// subscribe/request-keyframe where only the joining client should see
    /// it.
    pub fn send_to_client(&self, client_id: &str, packet: Bytes) {
        if let Some(client) = self.get(client_id) {
            client.enqueue(packet);
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_only_subscribed_clients() {
        let hub = ViewerHub::new();
        let a = ViewerClient::new("a");
        let b = ViewerClient::new("b");
        a.subscribe("dev_1");
        hub.register(a.clone());
        hub.register(b.clone());

        hub.broadcast_to_device("dev_1", Bytes::from_static(b"nal"));

        assert_eq!(a.recv().await.unwrap(), Bytes::from_static(b"nal"));
        assert!(b.is_closed() == false);
        // b never subscribed, so its queue stays empty; close it to end recv().
        b.close();
        assert!(b.recv().await.is_none());
    }

    #[tokio::test]
    async fn unregister_returns_client_for_cleanup() {
        let hub = ViewerHub::new();
        let a = ViewerClient::new("a");
        a.subscribe("dev_1");
        hub.register(a.clone());

        let removed = hub.unregister("a").unwrap();
        assert_eq!(removed.subscribed_devices(), vec!["dev_1".to_string()]);
        assert!(hub.get("a").is_none());
    }
}
