//! Device Agent Invoker: wraps the ADB command-line to enumerate devices
//! and drive per-device capture/control agents.

pub mod capture;
pub mod control;
pub mod device;

pub use capture::{ByteStream, CaptureBackend, CaptureHandle, PushedServerBackend, ScreenRecordBackend};
pub use device::Device;

use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::error::Result;

/// Facade combining device discovery with whichever `CaptureBackend` the
/// process was wired with. Stateless itself — any per-device mutable state
/// (forwarded ports, process handles) lives on the session that owns the
/// `CaptureHandle`, never here.
pub struct AdbInvoker {
    adb_path: String,
    backend: Arc<dyn CaptureBackend>,
}

impl AdbInvoker {
    pub fn new(adb_path: impl Into<String>, backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            adb_path: adb_path.into(),
            backend,
        }
    }

    /// Construct with the default, production-wired backend: `screenrecord`.
    pub fn with_default_backend(adb_path: impl Into<String>) -> Self {
        let adb_path = adb_path.into();
        let backend = Arc::new(ScreenRecordBackend::new(adb_path.clone()));
        Self { adb_path, backend }
    }

    pub async fn enumerate(&self) -> Result<Vec<Device>> {
        device::enumerate(&self.adb_path).await
    }

    pub async fn start_capture(
        &self,
        transport_id: &str,
        cfg: &CaptureConfig,
    ) -> Result<(ByteStream, CaptureHandle)> {
        self.backend.start(transport_id, cfg).await
    }

    pub async fn stop_capture(&self, handle: CaptureHandle) -> Result<()> {
        self.backend.stop(handle).await
    }

    pub async fn send_tap(&self, handle: &CaptureHandle, x: i32, y: i32) -> Result<()> {
        self.backend.send_tap(handle, x, y).await
    }

    pub async fn send_swipe(
        &self,
        handle: &CaptureHandle,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<()> {
        self.backend.send_swipe(handle, x1, y1, x2, y2, duration_ms).await
    }

    pub async fn send_key(&self, handle: &CaptureHandle, action: u8, keycode: u32, metastate: u32) -> Result<()> {
        self.backend.send_key(handle, action, keycode, metastate).await
    }

    pub async fn send_text(&self, handle: &CaptureHandle, text: &str) -> Result<()> {
        self.backend.send_text(handle, text).await
    }

    pub async fn send_clipboard(&self, handle: &CaptureHandle, text: &str, paste: bool) -> Result<()> {
        self.backend.send_clipboard(handle, text, paste).await
    }
}
