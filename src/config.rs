//! Process-lifetime configuration.
//!
//! There is no database-backed `ConfigStore` here: configuration is
//! rebuilt from CLI flags and environment variables on every process
//! start, with CLI > env > hardcoded default precedence.

use std::time::Duration;

/// Default encoder bitrate, bits/sec (~2 Mbps)
pub const DEFAULT_BITRATE: u32 = 2_000_000;
/// Default encoder frame size, `WxH`
pub const DEFAULT_SIZE: &str = "720x1280";

/// Warm-TTL: grace window a session stays RUNNING after its last viewer
/// leaves, absorbing brief unsubscribe/re-subscribe churn.
pub const WARM_TTL: Duration = Duration::from_secs(120);

/// Outbound per-client queue depth before drop-oldest kicks in.
pub const VIEWER_QUEUE_DEPTH: usize = 12;

/// Ping interval / write deadline for viewer WebSocket writers.
pub const WS_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive RUNNING seconds after which a backoff interval resets to 1.
pub const BACKOFF_RESET_AFTER_RUNNING: Duration = Duration::from_secs(60);

/// Cap on the exponential backoff delay, `min(N^2, 30)` seconds.
pub const BACKOFF_MAX_SECS: u64 = 30;

/// Video capture parameters applied when starting a device agent.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub bitrate: u32,
    pub size: String,
}

impl CaptureConfig {
    /// Build from environment, falling back to the hardcoded defaults.
    pub fn from_env() -> Self {
        let bitrate = std::env::var("H264_BITRATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BITRATE);
        let size = std::env::var("H264_SIZE").unwrap_or_else(|_| DEFAULT_SIZE.to_string());
        Self { bitrate, size }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            size: DEFAULT_SIZE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capture_config_matches_documented_defaults() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.bitrate, 2_000_000);
        assert_eq!(cfg.size, "720x1280");
    }
}
