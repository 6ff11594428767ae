//! Application-wide state shared across handlers, wiring the external
//! HTTP surface over the core streaming and control components.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::adb::AdbInvoker;
use crate::config::CaptureConfig;
use crate::control_plane::ControlPlane;
use crate::error::{AppError, Result};
use crate::hub::ViewerHub;
use crate::stream::StreamingSupervisor;

pub struct AppState {
    pub adb: Arc<AdbInvoker>,
    pub hub: Arc<ViewerHub>,
    pub supervisor: Arc<StreamingSupervisor>,
    pub control_plane: ControlPlane,
    pub capture_cfg: CaptureConfig,
    /// device id -> transport id, populated lazily from `AdbInvoker::enumerate`.
    /// Device scanning/listing itself is an out-of-core HTTP surface; this
    /// cache exists only so the in-core entry points (`start_streaming`,
    /// `subscribe`) can resolve a transport id.
    device_registry: RwLock<HashMap<String, String>>,
}

impl AppState {
    pub fn new(adb: Arc<AdbInvoker>, capture_cfg: CaptureConfig) -> Arc<Self> {
        let hub = ViewerHub::new();
        let supervisor = StreamingSupervisor::new(adb.clone(), hub.clone(), capture_cfg.clone());
        let control_plane = ControlPlane::new(adb.clone(), supervisor.clone());

        Arc::new(Self {
            adb,
            hub,
            supervisor,
            control_plane,
            capture_cfg,
            device_registry: RwLock::new(HashMap::new()),
        })
    }

    /// Resolves a device id to its current transport id, refreshing the
    /// cache with one `enumerate()` call if the id isn't already known.
    pub async fn resolve_transport_id(&self, device_id: &str) -> Result<String> {
        if let Some(transport_id) = self.device_registry.read().get(device_id).cloned() {
            return Ok(transport_id);
        }

        debug!(%device_id, "device id not cached, re-enumerating");
        let devices = self.adb.enumerate().await?;
        {
            let mut registry = self.device_registry.write();
            for device in &devices {
                registry.insert(device.id.clone(), device.transport_id.clone());
            }
        }

        self.device_registry
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| AppError::DeviceOffline(device_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::ScreenRecordBackend;

    #[tokio::test]
    async fn resolve_unknown_device_without_adb_available_is_offline_or_unavailable() {
        let backend = Arc::new(ScreenRecordBackend::new("adb-binary-that-does-not-exist"));
        let adb = Arc::new(AdbInvoker::new("adb-binary-that-does-not-exist", backend));
        let state = AppState::new(adb, CaptureConfig::default());
        let result = state.resolve_transport_id("dev_unknown").await;
        assert!(result.is_err());
    }
}
