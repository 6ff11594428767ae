//! Per-device Stream Session: state machine, parameter-set cache, and
//! viewer accounting. The supervisory loop that drives this
//! state machine through IDLE/STARTING/RUNNING/BACKOFF lives in
//! `supervisor.rs`; this module only holds the state itself so it can be
//! inspected and mutated safely from multiple tasks.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::adb::CaptureHandle;
use crate::nal::NalUnit;

use super::paramcache::ParamCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Backoff,
}

/// All mutable session state lives behind small, independently-locked
/// cells so the driving loop never needs to hold a lock across an
/// `.await` point.
pub struct StreamSession {
    pub device_id: String,
    pub transport_id: String,
    state: Mutex<SessionState>,
    /// A `tokio::sync::Mutex`, not `parking_lot`: the Control Plane needs
    /// to hold this lock across the `.await` of a `Send*` dispatch call
    /// without handing the handle itself out.
    handle: tokio::sync::Mutex<Option<CaptureHandle>>,
    cache: Mutex<ParamCache>,
    viewer_count: AtomicI64,
    warm_deadline: Mutex<Option<Instant>>,
    running_since: Mutex<Option<Instant>>,
    pub(super) driver: Mutex<Option<JoinHandle<()>>>,
    wake: Notify,
}

impl StreamSession {
    pub fn new(device_id: impl Into<String>, transport_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            transport_id: transport_id.into(),
            state: Mutex::new(SessionState::Idle),
            handle: tokio::sync::Mutex::new(None),
            cache: Mutex::new(ParamCache::default()),
            viewer_count: AtomicI64::new(0),
            warm_deadline: Mutex::new(None),
            running_since: Mutex::new(None),
            driver: Mutex::new(None),
            wake: Notify::new(),
        }
    }

    /// Interrupts a sleeping backoff delay immediately, used when a stop
    /// is requested or a viewer re-subscribes during backoff.
    pub fn request_wake(&self) {
        self.wake.notify_waiters();
    }

    pub async fn wait_for_wake(&self) {
        self.wake.notified().await;
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
        if state == SessionState::Running {
            *self.running_since.lock() = Some(Instant::now());
        }
    }

    /// How long the session has been continuously RUNNING, used to decide
    /// whether a restart's backoff counter should reset.
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        self.running_since.lock().map(|t| t.elapsed())
    }

    pub fn viewer_count(&self) -> i64 {
        self.viewer_count.load(Ordering::Acquire)
    }

    /// Returns the count after incrementing.
    pub fn add_viewer(&self) -> i64 {
        *self.warm_deadline.lock() = None;
        self.viewer_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count after decrementing (never below zero).
    pub fn remove_viewer(&self) -> i64 {
        loop {
            let current = self.viewer_count.load(Ordering::Acquire);
            let next = (current - 1).max(0);
            if self
                .viewer_count
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next;
            }
        }
    }

    pub fn set_warm_deadline(&self, deadline: Option<Instant>) {
        *self.warm_deadline.lock() = deadline;
    }

    /// `true` once a previously-set warm-TTL deadline has passed. `false`
    /// if no deadline is set (e.g. a viewer is attached).
    pub fn warm_ttl_elapsed(&self) -> bool {
        self.warm_deadline
            .lock()
            .map(|d| Instant::now() >= d)
            .unwrap_or(false)
    }

    pub fn observe_nal(&self, nal: &NalUnit) {
        self.cache.lock().observe(nal);
    }

    pub fn primer_bundle(&self) -> Option<Bytes> {
        self.cache.lock().primer_payload()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub async fn set_handle(&self, handle: CaptureHandle) {
        *self.handle.lock().await = Some(handle);
    }

    pub async fn take_handle(&self) -> Option<CaptureHandle> {
        self.handle.lock().await.take()
    }

    pub async fn has_handle(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Locks and returns the handle guard directly, so the Control Plane
    /// can hold it across the `.await` of a `Send*` dispatch call without
    /// ever taking ownership of the handle.
    pub async fn handle_guard(&self) -> tokio::sync::MutexGuard<'_, Option<CaptureHandle>> {
        self.handle.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_count_never_goes_negative() {
        let session = StreamSession::new("dev_A", "ABCDEF");
        assert_eq!(session.remove_viewer(), 0);
        session.add_viewer();
        assert_eq!(session.remove_viewer(), 0);
    }

    #[test]
    fn subscribe_then_unsubscribe_restores_count() {
        let session = StreamSession::new("dev_A", "ABCDEF");
        session.add_viewer();
        session.add_viewer();
        assert_eq!(session.viewer_count(), 2);
        session.remove_viewer();
        assert_eq!(session.viewer_count(), 1);
    }

    #[test]
    fn adding_a_viewer_clears_any_pending_warm_deadline() {
        let session = StreamSession::new("dev_A", "ABCDEF");
        session.set_warm_deadline(Some(Instant::now()));
        session.add_viewer();
        assert!(!session.warm_ttl_elapsed());
    }

    #[test]
    fn no_warm_deadline_means_not_elapsed() {
        let session = StreamSession::new("dev_A", "ABCDEF");
        assert!(!session.warm_ttl_elapsed());
    }

    #[test]
    fn warm_deadline_in_the_past_has_elapsed() {
        let session = StreamSession::new("dev_A", "ABCDEF");
        session.set_warm_deadline(Some(Instant::now() - std::time::Duration::from_secs(1)));
        assert!(session.warm_ttl_elapsed());
    }
}
