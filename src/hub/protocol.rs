//! Wire formats for the viewer-facing WebSocket.
//!
//! Inbound messages are JSON text frames. Outbound video is a binary frame
//! per NAL: a one-byte device-id length, the UTF-8 device id, then the raw
//! NAL bytes (start code included).

use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Subscribe { device_id: String },
    Unsubscribe { device_id: String },
    Tap { device_id: String, x: i32, y: i32 },
    Swipe {
        device_id: String,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        #[serde(default = "default_swipe_duration_ms")]
        duration_ms: u32,
    },
    Key {
        device_id: String,
        action: u8,
        keycode: u32,
        #[serde(default)]
        meta: u32,
    },
    Text { device_id: String, text: String },
    Clipboard {
        device_id: String,
        text: String,
        #[serde(default)]
        paste: bool,
    },
    RequestKeyframe { device_id: String },
}

fn default_swipe_duration_ms() -> u32 {
    300
}

/// `[1-byte id_len][id bytes][nal bytes]`.
pub fn encode_video_packet(device_id: &str, nal: &[u8]) -> Bytes {
    debug_assert!(device_id.len() <= u8::MAX as usize);
    let mut buf = BytesMut::with_capacity(1 + device_id.len() + nal.len());
    buf.put_u8(device_id.len() as u8);
    buf.put_slice(device_id.as_bytes());
    buf.put_slice(nal);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_message_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","device_id":"dev_ABC"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { device_id } if device_id == "dev_ABC"));
    }

    #[test]
    fn swipe_duration_defaults_when_absent() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"swipe","device_id":"dev_ABC","x1":0,"y1":0,"x2":10,"y2":10}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Swipe { duration_ms, .. } => assert_eq!(duration_ms, 300),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn video_packet_layout() {
        let packet = encode_video_packet("dev_A", &[0x00, 0x00, 0x00, 0x01, 0x67]);
        assert_eq!(packet[0], 5);
        assert_eq!(&packet[1..6], b"dev_A");
        assert_eq!(&packet[6..], &[0x00, 0x00, 0x00, 0x01, 0x67]);
    }
}
