//! Capture-agent lifecycle: spawning the on-device H.264 producer and
//! dispatching input back to it.
//!
//! Two interchangeable implementations sit behind one `CaptureBackend`
//! trait: one trait, several swappable backends selected once at
//! construction and never downcast.

use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::adb::control;
use crate::config::CaptureConfig;
use crate::error::{AppError, Result};

/// Live handle to a running capture agent. Holds everything `Stop` and the
/// per-path `Send*` dispatch methods need; owned exclusively by the Stream
/// Session that started it.
pub enum CaptureHandle {
    ScreenRecord {
        transport_id: String,
        child: Child,
    },
    PushedServer {
        transport_id: String,
        child: Child,
        forwarded_port: u16,
        control: tokio::sync::Mutex<TcpStream>,
    },
}

impl CaptureHandle {
    pub fn transport_id(&self) -> &str {
        match self {
            CaptureHandle::ScreenRecord { transport_id, .. } => transport_id,
            CaptureHandle::PushedServer { transport_id, .. } => transport_id,
        }
    }

    /// Best-effort check that the underlying process hasn't exited yet.
    pub fn is_alive(&mut self) -> bool {
        let child = match self {
            CaptureHandle::ScreenRecord { child, .. } => child,
            CaptureHandle::PushedServer { child, .. } => child,
        };
        matches!(child.try_wait(), Ok(None))
    }
}

pub type ByteStream = Box<dyn AsyncRead + Unpin + Send>;

/// One capture-and-control implementation. Exactly one is wired into the
/// supervisor at construction time: `screenrecord` is the default; the
/// pushed-server path remains a pluggable alternative behind this same
/// trait.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn start(&self, transport_id: &str, cfg: &CaptureConfig) -> Result<(ByteStream, CaptureHandle)>;

    async fn stop(&self, handle: CaptureHandle) -> Result<()>;

    async fn send_tap(&self, handle: &CaptureHandle, x: i32, y: i32) -> Result<()>;

    async fn send_swipe(
        &self,
        handle: &CaptureHandle,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<()>;

    async fn send_key(&self, handle: &CaptureHandle, action: u8, keycode: u32, metastate: u32) -> Result<()>;

    async fn send_text(&self, handle: &CaptureHandle, text: &str) -> Result<()>;

    async fn send_clipboard(&self, handle: &CaptureHandle, text: &str, paste: bool) -> Result<()>;
}

/// Production path: the platform `screenrecord` utility in raw H.264 mode.
/// Its ≈3 minute time cap is masked by the supervisor's immediate restart
/// on clean exit.
pub struct ScreenRecordBackend {
    adb_path: String,
}

impl ScreenRecordBackend {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    async fn shell_input(&self, transport_id: &str, args: &[&str]) -> Result<()> {
        let mut full_args = vec!["-s", transport_id, "shell", "input"];
        full_args.extend_from_slice(args);

        let status = Command::new(&self.adb_path)
            .args(&full_args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(AppError::ControlSendFailed {
                device: transport_id.to_string(),
                reason: format!("adb shell input exited with {status}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureBackend for ScreenRecordBackend {
    async fn start(&self, transport_id: &str, cfg: &CaptureConfig) -> Result<(ByteStream, CaptureHandle)> {
        let bitrate_arg = format!("--bit-rate={}", cfg.bitrate);
        let size_arg = format!("--size={}", cfg.size);

        let mut child = Command::new(&self.adb_path)
            .args([
                "-s",
                transport_id,
                "exec-out",
                "screenrecord",
                "--output-format=h264",
                &bitrate_arg,
                &size_arg,
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::AgentSpawnFailed {
                device: transport_id.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| AppError::AgentSpawnFailed {
            device: transport_id.to_string(),
            reason: "capture process has no stdout pipe".to_string(),
        })?;

        Ok((
            Box::new(stdout),
            CaptureHandle::ScreenRecord {
                transport_id: transport_id.to_string(),
                child,
            },
        ))
    }

    async fn stop(&self, mut handle: CaptureHandle) -> Result<()> {
        if let CaptureHandle::ScreenRecord { child, .. } = &mut handle {
            let _ = child.kill().await;
        }
        Ok(())
    }

    async fn send_tap(&self, handle: &CaptureHandle, x: i32, y: i32) -> Result<()> {
        self.shell_input(handle.transport_id(), &["tap", &x.to_string(), &y.to_string()])
            .await
    }

    async fn send_swipe(
        &self,
        handle: &CaptureHandle,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<()> {
        self.shell_input(
            handle.transport_id(),
            &[
                "swipe",
                &x1.to_string(),
                &y1.to_string(),
                &x2.to_string(),
                &y2.to_string(),
                &duration_ms.to_string(),
            ],
        )
        .await
    }

    async fn send_key(&self, handle: &CaptureHandle, _action: u8, keycode: u32, _metastate: u32) -> Result<()> {
        // `input keyevent` issues a single down+up pulse; the shell command
        // has no way to express a held action or metastate.
        self.shell_input(handle.transport_id(), &["keyevent", &keycode.to_string()])
            .await
    }

    async fn send_text(&self, handle: &CaptureHandle, text: &str) -> Result<()> {
        // `input text` requires spaces escaped; `%s` is the adb shell convention.
        let escaped = text.replace(' ', "%s");
        self.shell_input(handle.transport_id(), &["text", &escaped]).await
    }

    async fn send_clipboard(&self, handle: &CaptureHandle, _text: &str, _paste: bool) -> Result<()> {
        // `adb shell input` has no clipboard primitive; only the
        // pushed-server control channel supports clipboard injection.
        Err(AppError::ControlSendFailed {
            device: handle.transport_id().to_string(),
            reason: "clipboard injection requires the pushed-server backend".to_string(),
        })
    }
}

/// Alternative path: push a capture server binary and speak its binary
/// control protocol over a forwarded local TCP port. Implemented as the
/// non-default pluggable backend.
pub struct PushedServerBackend {
    adb_path: String,
    server_binary_path: String,
    next_forward_port: AtomicU32,
}

impl PushedServerBackend {
    pub fn new(adb_path: impl Into<String>, server_binary_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            server_binary_path: server_binary_path.into(),
            next_forward_port: AtomicU32::new(0),
        }
    }

    /// SCID must be representable as a signed 32-bit integer.
    fn random_scid() -> u32 {
        rand::thread_rng().gen_range(0..=0x7FFF_FFFFu32)
    }
}

#[async_trait]
impl CaptureBackend for PushedServerBackend {
    async fn start(&self, transport_id: &str, _cfg: &CaptureConfig) -> Result<(ByteStream, CaptureHandle)> {
        let scid = Self::random_scid();
        let socket_name = format!("scrcpy_{scid:08x}");
        let remote_path = "/data/local/tmp/capture-server.jar";

        let push_status = Command::new(&self.adb_path)
            .args(["-s", transport_id, "push", &self.server_binary_path, remote_path])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !push_status.success() {
            return Err(AppError::AgentSpawnFailed {
                device: transport_id.to_string(),
                reason: "adb push failed".to_string(),
            });
        }

        // ask the OS for an ephemeral port, then forward it to the device's
        // abstract socket; no port pool is maintained.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let local_port = listener.local_addr()?.port();
        drop(listener);

        let forward_spec = format!("tcp:{local_port}");
        let remote_spec = format!("localabstract:{socket_name}");
        let forward_status = Command::new(&self.adb_path)
            .args(["-s", transport_id, "forward", &forward_spec, &remote_spec])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !forward_status.success() {
            return Err(AppError::AgentSpawnFailed {
                device: transport_id.to_string(),
                reason: "adb forward failed".to_string(),
            });
        }
        self.next_forward_port.store(local_port as u32, Ordering::SeqCst);

        let child = Command::new(&self.adb_path)
            .args([
                "-s",
                transport_id,
                "shell",
                "CLASSPATH=/data/local/tmp/capture-server.jar",
                "app_process",
                "/",
                "com.genymobile.scrcpy.Server",
                "raw_stream=true",
                "control=true",
                &format!("scid={scid:08x}"),
            ])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::AgentSpawnFailed {
                device: transport_id.to_string(),
                reason: e.to_string(),
            })?;

        // video connection: after `raw_stream=true` no metadata precedes
        // the elementary stream.
        let video = TcpStream::connect(("127.0.0.1", local_port)).await?;
        // control connection: a second independent socket to the same name.
        let control_stream = TcpStream::connect(("127.0.0.1", local_port)).await?;

        Ok((
            Box::new(video),
            CaptureHandle::PushedServer {
                transport_id: transport_id.to_string(),
                child,
                forwarded_port: local_port,
                control: tokio::sync::Mutex::new(control_stream),
            },
        ))
    }

    async fn stop(&self, mut handle: CaptureHandle) -> Result<()> {
        if let CaptureHandle::PushedServer {
            transport_id,
            child,
            forwarded_port,
            ..
        } = &mut handle
        {
            let _ = child.kill().await;
            let forward_spec = format!("tcp:{forwarded_port}");
            let _ = Command::new(&self.adb_path)
                .args(["-s", transport_id, "forward", "--remove", &forward_spec])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
        }
        Ok(())
    }

    async fn send_tap(&self, handle: &CaptureHandle, x: i32, y: i32) -> Result<()> {
        self.send_touch_message(handle, control::TouchAction::Down, x, y).await?;
        self.send_touch_message(handle, control::TouchAction::Up, x, y).await
    }

    async fn send_swipe(
        &self,
        handle: &CaptureHandle,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        _duration_ms: u32,
    ) -> Result<()> {
        self.send_touch_message(handle, control::TouchAction::Down, x1, y1).await?;
        self.send_touch_message(handle, control::TouchAction::Move, x2, y2).await?;
        self.send_touch_message(handle, control::TouchAction::Up, x2, y2).await
    }

    async fn send_key(&self, handle: &CaptureHandle, action: u8, keycode: u32, metastate: u32) -> Result<()> {
        let msg = control::encode_inject_keycode(action, keycode, 0, metastate);
        self.write_control(handle, &msg).await
    }

    async fn send_text(&self, handle: &CaptureHandle, text: &str) -> Result<()> {
        let msg = control::encode_inject_text(text)?;
        self.write_control(handle, &msg).await
    }

    async fn send_clipboard(&self, handle: &CaptureHandle, text: &str, paste: bool) -> Result<()> {
        let msg = control::encode_set_clipboard(0, paste, text)?;
        self.write_control(handle, &msg).await
    }
}

impl PushedServerBackend {
    async fn write_control(&self, handle: &CaptureHandle, msg: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let CaptureHandle::PushedServer { control, transport_id, .. } = handle else {
            return Err(AppError::ControlSendFailed {
                device: handle.transport_id().to_string(),
                reason: "not a pushed-server handle".to_string(),
            });
        };
        let mut stream = control.lock().await;
        stream.write_all(msg).await.map_err(|e| AppError::ControlSendFailed {
            device: transport_id.clone(),
            reason: e.to_string(),
        })
    }

    async fn send_touch_message(
        &self,
        handle: &CaptureHandle,
        action: control::TouchAction,
        x: i32,
        y: i32,
    ) -> Result<()> {
        let msg = control::encode_inject_touch(action, x, y);
        self.write_control(handle, &msg).await
    }
}
