//! Control Plane: routes viewer input to the right device's capture
//! agent. Stateless itself — it only resolves a device id to a session
//! and forwards to whichever `CaptureBackend` the Agent Invoker was built
//! with.

use std::sync::Arc;

use crate::adb::AdbInvoker;
use crate::error::{AppError, Result};
use crate::stream::StreamingSupervisor;

pub struct ControlPlane {
    adb: Arc<AdbInvoker>,
    supervisor: Arc<StreamingSupervisor>,
}

impl ControlPlane {
    pub fn new(adb: Arc<AdbInvoker>, supervisor: Arc<StreamingSupervisor>) -> Self {
        Self { adb, supervisor }
    }

    fn not_found(device_id: &str) -> AppError {
        AppError::NotFound(format!("no stream session for device {device_id}"))
    }

    fn offline(device_id: &str) -> AppError {
        AppError::DeviceOffline(device_id.to_string())
    }

    pub async fn tap(&self, device_id: &str, x: i32, y: i32) -> Result<()> {
        let session = self.supervisor.session(device_id).ok_or_else(|| Self::not_found(device_id))?;
        let guard = session.handle_guard().await;
        let handle = guard.as_ref().ok_or_else(|| Self::offline(device_id))?;
        self.adb.send_tap(handle, x, y).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn swipe(
        &self,
        device_id: &str,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<()> {
        let session = self.supervisor.session(device_id).ok_or_else(|| Self::not_found(device_id))?;
        let guard = session.handle_guard().await;
        let handle = guard.as_ref().ok_or_else(|| Self::offline(device_id))?;
        self.adb.send_swipe(handle, x1, y1, x2, y2, duration_ms).await
    }

    pub async fn key(&self, device_id: &str, action: u8, keycode: u32, metastate: u32) -> Result<()> {
        let session = self.supervisor.session(device_id).ok_or_else(|| Self::not_found(device_id))?;
        let guard = session.handle_guard().await;
        let handle = guard.as_ref().ok_or_else(|| Self::offline(device_id))?;
        self.adb.send_key(handle, action, keycode, metastate).await
    }

    pub async fn text(&self, device_id: &str, text: &str) -> Result<()> {
        let session = self.supervisor.session(device_id).ok_or_else(|| Self::not_found(device_id))?;
        let guard = session.handle_guard().await;
        let handle = guard.as_ref().ok_or_else(|| Self::offline(device_id))?;
        self.adb.send_text(handle, text).await
    }

    pub async fn clipboard(&self, device_id: &str, text: &str, paste: bool) -> Result<()> {
        let session = self.supervisor.session(device_id).ok_or_else(|| Self::not_found(device_id))?;
        let guard = session.handle_guard().await;
        let handle = guard.as_ref().ok_or_else(|| Self::offline(device_id))?;
        self.adb.send_clipboard(handle, text, paste).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::ScreenRecordBackend;
    use crate::config::CaptureConfig;
    use crate::hub::ViewerHub;

    fn test_control_plane() -> ControlPlane {
        let backend = Arc::new(ScreenRecordBackend::new("adb"));
        let adb = Arc::new(AdbInvoker::new("adb", backend));
        let hub = ViewerHub::new();
        let supervisor = StreamingSupervisor::new(adb.clone(), hub, CaptureConfig::default());
        ControlPlane::new(adb, supervisor)
    }

    #[tokio::test]
    async fn tap_on_unknown_device_is_not_found() {
        let cp = test_control_plane();
        let err = cp.tap("dev_missing", 10, 20).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
