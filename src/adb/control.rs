//! Binary control-message codec for the pushed-server capture path,
//! big-endian throughout.
//!
//! | Type code | Name           | Payload                                            |
//! |-----------|----------------|-----------------------------------------------------|
//! | 0         | inject_keycode | 1 action, 4 keycode, 4 repeat, 4 metastate          |
//! | 1         | inject_text    | 4 length (<= 300), N UTF-8 bytes                    |
//! | 2         | inject_touch   | 1 action, 4 x, 4 y                                  |
//! | 9         | set_clipboard  | 8 sequence, 1 paste-flag, 4 length, N UTF-8 bytes   |

use crate::error::{AppError, Result};

pub const MSG_INJECT_KEYCODE: u8 = 0;
pub const MSG_INJECT_TEXT: u8 = 1;
pub const MSG_INJECT_TOUCH: u8 = 2;
pub const MSG_SET_CLIPBOARD: u8 = 9;

/// Maximum UTF-8 byte length of a single `inject_text` payload.
pub const MAX_TEXT_LEN: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    Down,
    Up,
    Move,
}

impl TouchAction {
    fn code(self) -> u8 {
        match self {
            TouchAction::Down => 0,
            TouchAction::Up => 1,
            TouchAction::Move => 2,
        }
    }
}

pub fn encode_inject_keycode(action: u8, keycode: u32, repeat: u32, metastate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 1 + 4 + 4 + 4);
    buf.push(MSG_INJECT_KEYCODE);
    buf.push(action);
    buf.extend_from_slice(&keycode.to_be_bytes());
    buf.extend_from_slice(&repeat.to_be_bytes());
    buf.extend_from_slice(&metastate.to_be_bytes());
    buf
}

/// Text injection is preferred over per-keycode events for printable
/// characters, for correct Unicode handling.
pub fn encode_inject_text(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_TEXT_LEN {
        return Err(AppError::BadRequest(format!(
            "text payload of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_TEXT_LEN
        )));
    }
    let mut buf = Vec::with_capacity(1 + 4 + bytes.len());
    buf.push(MSG_INJECT_TEXT);
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(buf)
}

pub fn encode_inject_touch(action: TouchAction, x: i32, y: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 1 + 4 + 4);
    buf.push(MSG_INJECT_TOUCH);
    buf.push(action.code());
    buf.extend_from_slice(&x.to_be_bytes());
    buf.extend_from_slice(&y.to_be_bytes());
    buf
}

pub fn encode_set_clipboard(sequence: u64, paste: bool, text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    if bytes.len() > MAX_TEXT_LEN {
        return Err(AppError::BadRequest(format!(
            "clipboard payload of {} bytes exceeds the {} byte limit",
            bytes.len(),
            MAX_TEXT_LEN
        )));
    }
    let mut buf = Vec::with_capacity(1 + 8 + 1 + 4 + bytes.len());
    buf.push(MSG_SET_CLIPBOARD);
    buf.extend_from_slice(&sequence.to_be_bytes());
    buf.push(u8::from(paste));
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycode_layout_is_big_endian() {
        let msg = encode_inject_keycode(1, 0x0000_0042, 2, 0x0000_0001);
        assert_eq!(msg[0], MSG_INJECT_KEYCODE);
        assert_eq!(msg[1], 1);
        assert_eq!(&msg[2..6], &[0, 0, 0, 0x42]);
        assert_eq!(&msg[6..10], &[0, 0, 0, 2]);
        assert_eq!(&msg[10..14], &[0, 0, 0, 1]);
    }

    #[test]
    fn text_over_limit_is_rejected() {
        let text = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(encode_inject_text(&text).is_err());
    }

    #[test]
    fn text_layout_includes_length_prefix() {
        let msg = encode_inject_text("hi").unwrap();
        assert_eq!(msg[0], MSG_INJECT_TEXT);
        assert_eq!(&msg[1..5], &[0, 0, 0, 2]);
        assert_eq!(&msg[5..7], b"hi");
    }

    #[test]
    fn clipboard_layout_round_trips_fields() {
        let msg = encode_set_clipboard(7, true, "ab").unwrap();
        assert_eq!(msg[0], MSG_SET_CLIPBOARD);
        assert_eq!(&msg[1..9], &7u64.to_be_bytes());
        assert_eq!(msg[9], 1);
        assert_eq!(&msg[10..14], &[0, 0, 0, 2]);
        assert_eq!(&msg[14..16], b"ab");
    }
}
