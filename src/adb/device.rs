//! Device discovery: `adb devices -l` enumeration, per-device property
//! queries, and USB/Wi-Fi dual-connection dedup.

use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// A discovered Android device. Replaced wholesale on each fresh
/// `enumerate()` call — never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable id, prefixed hardware serial (e.g. `dev_ABCDEF123456`)
    pub id: String,
    /// ADB-visible transport handle; may differ for USB vs Wi-Fi
    pub transport_id: String,
    pub name: String,
    pub online: bool,
    pub width: u32,
    pub height: u32,
}

impl Device {
    pub fn id_for_serial(serial: &str) -> String {
        format!("dev_{serial}")
    }
}

/// A Wi-Fi transport id takes the `host:port` form; USB transport ids
/// (serials, or `usb:...` handles) never contain a colon.
fn is_wifi_transport(transport_id: &str) -> bool {
    transport_id.contains(':')
}

/// Run `adb devices -l` and parse online devices, then resolve each one's
/// hardware serial and resolution, deduplicating USB/Wi-Fi twins by
/// serial (the Wi-Fi entry wins).
pub async fn enumerate(adb_path: &str) -> Result<Vec<Device>> {
    let output = Command::new(adb_path)
        .args(["devices", "-l"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| AppError::AdbUnavailable(e.to_string()))?;

    if !output.status.success() {
        return Err(AppError::AdbUnavailable(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let transport_ids = parse_devices_l(&stdout);

    // transport_id -> device, keyed by resolved serial for dedup
    let mut by_serial: HashMap<String, Device> = HashMap::new();

    for transport_id in transport_ids {
        match query_device(adb_path, &transport_id).await {
            Ok(device) => {
                let serial = device.id.clone();
                match by_serial.get(&serial) {
                    Some(existing) if is_wifi_transport(&existing.transport_id) => {
                        // already have the Wi-Fi entry; USB duplicate is dropped
                        debug!(%serial, dropped = %transport_id, "dropping USB duplicate");
                    }
                    _ => {
                        by_serial.insert(serial, device);
                    }
                }
            }
            Err(e) => {
                warn!(%transport_id, error = %e, "failed to query device, skipping");
            }
        }
    }

    Ok(by_serial.into_values().collect())
}

/// Parse the body lines of `adb devices -l`, returning transport ids whose
/// state is `device` (online). Skips the `List of devices attached` header
/// and offline/unauthorized entries.
fn parse_devices_l(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut fields = line.split_whitespace();
            let transport_id = fields.next()?;
            let state = fields.next()?;
            (state == "device").then(|| transport_id.to_string())
        })
        .collect()
}

async fn query_device(adb_path: &str, transport_id: &str) -> Result<Device> {
    let serial = shell(adb_path, transport_id, &["getprop", "ro.serialno"])
        .await?
        .trim()
        .to_string();
    let serial = if serial.is_empty() {
        transport_id.to_string()
    } else {
        serial
    };

    let (width, height) = query_resolution(adb_path, transport_id).await;

    Ok(Device {
        id: Device::id_for_serial(&serial),
        transport_id: transport_id.to_string(),
        name: serial,
        online: true,
        width,
        height,
    })
}

/// `wm size` reports both physical and override size; the override size
/// is preferred when present.
async fn query_resolution(adb_path: &str, transport_id: &str) -> (u32, u32) {
    let output = match shell(adb_path, transport_id, &["wm", "size"]).await {
        Ok(out) => out,
        Err(_) => return (0, 0),
    };

    let mut physical = None;
    let mut override_size = None;
    for line in output.lines() {
        if let Some(rest) = line.trim().strip_prefix("Physical size: ") {
            physical = parse_wxh(rest);
        } else if let Some(rest) = line.trim().strip_prefix("Override size: ") {
            override_size = parse_wxh(rest);
        }
    }

    override_size.or(physical).unwrap_or((0, 0))
}

fn parse_wxh(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.trim().split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

async fn shell(adb_path: &str, transport_id: &str, args: &[&str]) -> Result<String> {
    let mut cmd_args = vec!["-s", transport_id, "shell"];
    cmd_args.extend_from_slice(args);

    let output = Command::new(adb_path)
        .args(&cmd_args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_online_devices_only() {
        let output = "List of devices attached\n\
             ABCDEF\tdevice usb:1-1 product:foo\n\
             192.168.1.10:5555\tdevice\n\
             XYZ\tunauthorized\n\
             \n";
        let ids = parse_devices_l(output);
        assert_eq!(ids, vec!["ABCDEF", "192.168.1.10:5555"]);
    }

    #[test]
    fn wifi_transport_detected_by_colon() {
        assert!(is_wifi_transport("192.168.1.10:5555"));
        assert!(!is_wifi_transport("ABCDEF"));
    }

    #[test]
    fn override_size_preferred_over_physical() {
        let wm_output = "Physical size: 1080x1920\nOverride size: 720x1280\n";
        let mut physical = None;
        let mut override_size = None;
        for line in wm_output.lines() {
            if let Some(rest) = line.strip_prefix("Physical size: ") {
                physical = parse_wxh(rest);
            } else if let Some(rest) = line.strip_prefix("Override size: ") {
                override_size = parse_wxh(rest);
            }
        }
        assert_eq!(override_size.or(physical), Some((720, 1280)));
    }

    #[test]
    fn id_is_serial_prefixed() {
        assert_eq!(Device::id_for_serial("ABCDEF"), "dev_ABCDEF");
    }
}
