//! Streaming Supervisor: owns the map of per-device Stream Sessions and
//! drives each one through IDLE → STARTING → RUNNING → BACKOFF →
//! (restart or IDLE).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::adb::AdbInvoker;
use crate::config::{CaptureConfig, BACKOFF_MAX_SECS, BACKOFF_RESET_AFTER_RUNNING, WARM_TTL};
use crate::error::Result;
use crate::hub::{encode_video_packet, ViewerHub};
use crate::nal::NalFramer;
use crate::utils::LogThrottler;

use super::session::{SessionState, StreamSession};

/// Manages every device's Stream Session: created on first subscribe or
/// explicit start, kept alive while viewers are attached plus a warm-TTL
/// grace window, and restarted on agent death.
pub struct StreamingSupervisor {
    adb: Arc<AdbInvoker>,
    hub: Arc<ViewerHub>,
    capture_cfg: CaptureConfig,
    sessions: RwLock<HashMap<String, Arc<StreamSession>>>,
    throttle: LogThrottler,
}

impl StreamingSupervisor {
    pub fn new(adb: Arc<AdbInvoker>, hub: Arc<ViewerHub>, capture_cfg: CaptureConfig) -> Arc<Self> {
        Arc::new(Self {
            adb,
            hub,
            capture_cfg,
            sessions: RwLock::new(HashMap::new()),
            throttle: LogThrottler::with_secs(10),
        })
    }

    fn get_session(&self, device_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.read().get(device_id).cloned()
    }

    /// Exposes a session for the Control Plane's input dispatch; returns
    /// `None` for a device id with no session (e.g. never started).
    pub fn session(&self, device_id: &str) -> Option<Arc<StreamSession>> {
        self.get_session(device_id)
    }

    fn get_or_create_session(&self, device_id: &str, transport_id: &str) -> Arc<StreamSession> {
        if let Some(existing) = self.get_session(device_id) {
            return existing;
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(StreamSession::new(device_id, transport_id)))
            .clone()
    }

    /// `StartStreaming(D)`: idempotent — calling it while already
    /// STARTING/RUNNING is a no-op.
    pub fn start_streaming(self: &Arc<Self>, device_id: &str, transport_id: &str) {
        let session = self.get_or_create_session(device_id, transport_id);
        self.ensure_driver_running(session);
    }

    /// `StopStreaming(D)`: idempotent. Kills the agent directly, which is
    /// what causes the driver loop's in-flight read to fail and exit
    /// without restarting.
    pub async fn stop_streaming(&self, device_id: &str) -> Result<()> {
        let Some(session) = self.get_session(device_id) else {
            return Ok(());
        };
        session.set_state(SessionState::Idle);
        session.request_wake();
        if let Some(handle) = session.take_handle().await {
            self.adb.stop_capture(handle).await?;
        }
        Ok(())
    }

    /// `AddViewer(D)`: starts the session if needed and returns the
    /// cached primer bundle, if one exists, so the caller can immediately
    /// enqueue it to the newly-subscribed client.
    pub fn add_viewer(self: &Arc<Self>, device_id: &str, transport_id: &str) -> Option<bytes::Bytes> {
        let session = self.get_or_create_session(device_id, transport_id);
        session.add_viewer();
        session.request_wake();
        self.ensure_driver_running(session.clone());
        session.primer_bundle()
    }

    /// `RemoveViewer(D)`: decrements the count and, if it reaches zero,
    /// schedules a warm-TTL reap.
    pub fn remove_viewer(self: &Arc<Self>, device_id: &str) {
        let Some(session) = self.get_session(device_id) else {
            return;
        };
        if session.remove_viewer() == 0 {
            session.set_warm_deadline(Some(Instant::now() + WARM_TTL));
            let supervisor = self.clone();
            let device_id = device_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(WARM_TTL).await;
                supervisor.reap_if_warm_expired(&device_id).await;
            });
        }
    }

    pub fn primer_bundle(&self, device_id: &str) -> Option<bytes::Bytes> {
        self.get_session(device_id).and_then(|s| s.primer_bundle())
    }

    /// Invoked after a warm-TTL sleep; a no-op if a viewer re-subscribed
    /// in the meantime (the deadline will have been cleared) or if the
    /// session isn't RUNNING any more.
    async fn reap_if_warm_expired(&self, device_id: &str) {
        let Some(session) = self.get_session(device_id) else {
            return;
        };
        if session.viewer_count() > 0 {
            return;
        }
        if !session.warm_ttl_elapsed() {
            return;
        }
        if session.state() != SessionState::Running && session.state() != SessionState::Starting {
            return;
        }
        info!(%device_id, "warm-TTL elapsed with no viewers, stopping session");
        session.set_state(SessionState::Idle);
        session.request_wake();
        if let Some(handle) = session.take_handle().await {
            let _ = self.adb.stop_capture(handle).await;
        }
    }

    /// Spawns the driver task if one isn't already running for this
    /// session.
    fn ensure_driver_running(self: &Arc<Self>, session: Arc<StreamSession>) {
        let mut driver = session.driver.lock();
        let needs_spawn = match driver.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        };
        if needs_spawn {
            if session.state() == SessionState::Idle {
                session.set_state(SessionState::Starting);
            }
            let supervisor = self.clone();
            let session_for_task = session.clone();
            *driver = Some(tokio::spawn(async move {
                Self::drive(supervisor, session_for_task).await;
            }));
        }
    }

    /// The per-session state machine loop: spawns the agent, streams NALs
    /// into the hub, and on exit either restarts (masking the
    /// `screenrecord` time cap) or goes IDLE.
    async fn drive(self: Arc<Self>, session: Arc<StreamSession>) {
        let mut attempt: u32 = 0;

        loop {
            if session.state() == SessionState::Idle {
                break;
            }
            session.set_state(SessionState::Starting);

            match self.adb.start_capture(&session.transport_id, &self.capture_cfg).await {
                Ok((stream, handle)) => {
                    session.clear_cache();
                    session.set_handle(handle).await;
                    session.set_state(SessionState::Running);
                    attempt = 0;

                    let mut framer = NalFramer::new(stream);
                    loop {
                        match framer.next_unit().await {
                            Ok(Some(nal)) => {
                                session.observe_nal(&nal);
                                let packet = encode_video_packet(&session.device_id, &nal.data);
                                self.hub.broadcast_to_device(&session.device_id, packet);
                            }
                            Ok(None) => {
                                debug!(device_id = %session.device_id, "agent stream ended cleanly");
                                break;
                            }
                            Err(e) => {
                                if self.throttle.should_log(&session.device_id) {
                                    warn!(device_id = %session.device_id, error = %e, "framer error, restarting session");
                                }
                                break;
                            }
                        }
                    }

                    if let Some(handle) = session.take_handle().await {
                        let _ = self.adb.stop_capture(handle).await;
                    }
                    session.clear_cache();
                }
                Err(e) => {
                    if self.throttle.should_log(&session.device_id) {
                        warn!(device_id = %session.device_id, error = %e, "failed to start capture agent");
                    }
                }
            }

            if session.state() == SessionState::Idle {
                break;
            }

            let ran_long_enough = session
                .running_duration()
                .map(|d| d >= BACKOFF_RESET_AFTER_RUNNING)
                .unwrap_or(false);
            if ran_long_enough {
                attempt = 0;
            }
            attempt += 1;
            session.set_state(SessionState::Backoff);

            // first restart is immediate to mask the screenrecord time
            // cap; subsequent attempts back off exponentially.
            let delay_secs = if attempt <= 1 {
                0
            } else {
                u64::from(attempt).saturating_mul(u64::from(attempt)).min(BACKOFF_MAX_SECS)
            };
            if delay_secs > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(delay_secs)) => {}
                    _ = session.wait_for_wake() => {}
                }
            }

            if session.state() == SessionState::Idle {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::ScreenRecordBackend;

    fn test_supervisor() -> Arc<StreamingSupervisor> {
        let backend = Arc::new(ScreenRecordBackend::new("adb"));
        let adb = Arc::new(AdbInvoker::new("adb", backend));
        let hub = ViewerHub::new();
        StreamingSupervisor::new(adb, hub, CaptureConfig::default())
    }

    #[tokio::test]
    async fn remove_viewer_without_prior_add_is_a_no_op() {
        let supervisor = test_supervisor();
        // no session exists yet; must not panic
        supervisor.remove_viewer("dev_missing");
    }

    #[tokio::test]
    async fn primer_bundle_is_none_before_any_sps_pps() {
        let supervisor = test_supervisor();
        supervisor.start_streaming("dev_A", "ABCDEF");
        assert!(supervisor.primer_bundle("dev_A").is_none());
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_restores_viewer_count() {
        let supervisor = test_supervisor();
        let session = supervisor.get_or_create_session("dev_A", "ABCDEF");
        session.add_viewer();
        assert_eq!(session.viewer_count(), 1);
        supervisor.remove_viewer("dev_A");
        assert_eq!(session.viewer_count(), 0);
    }
}
