//! Binary codec for protocol frames.
//!
//! Wire format:
//! ```text
//! [version:2][type:1][timestamp_ms:4][payload_size:2][payload:N]
//! ```
//! Header size: 9 bytes. All multi-byte integers are little-endian.
//!
//! `timestamp_ms` is the sender's monotonic millisecond counter; receivers
//! use it only for diagnostics. Frames are validated on receive: a bad
//! version or an impossible payload size is session-fatal, while an unknown
//! event type is a soft error (the payload is consumed and discarded).

use thiserror::Error;

use crate::protocol::events::{
    Event, EventType, KeyEvent, MouseButton, MouseButtonEvent, MouseMoveEvent, MouseScrollEvent,
    ScreenEdge, ScreenInfoEvent, SwitchScreenEvent, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PROTOCOL_VERSION,
};

/// Errors that can occur during frame encoding or decoding.
///
/// Every variant except the soft unknown-type path (which is not an error,
/// see [`decode_payload`]) terminates the session on the receiving side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The byte slice is shorter than the structure being decoded.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The protocol version in the header is not supported.
    #[error("invalid protocol version: {0}")]
    UnsupportedVersion(u16),

    /// The declared payload size exceeds [`MAX_PAYLOAD_SIZE`].
    #[error("invalid packet size: declared payload of {declared} bytes")]
    OversizedPayload { declared: usize },

    /// The declared payload is smaller than the fixed size of its type.
    #[error("invalid packet size: {event_type:?} needs {needed} bytes, got {declared}")]
    UndersizedPayload {
        event_type: EventType,
        declared: usize,
        needed: usize,
    },
}

// ── Frame header ──────────────────────────────────────────────────────────────

/// The 9-byte header prepended to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u16,
    /// Raw type byte; may name a type this build does not know.
    pub type_id: u8,
    pub timestamp_ms: u32,
    pub payload_size: u16,
}

impl FrameHeader {
    /// Decodes and validates a header from the first [`HEADER_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InsufficientData`] on a short slice,
    /// [`CodecError::UnsupportedVersion`] on a version mismatch, and
    /// [`CodecError::OversizedPayload`] when the declared payload exceeds
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::InsufficientData {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let header = Self {
            version: u16::from_le_bytes([bytes[0], bytes[1]]),
            type_id: bytes[2],
            timestamp_ms: u32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]),
            payload_size: u16::from_le_bytes([bytes[7], bytes[8]]),
        };
        header.validate()?;
        Ok(header)
    }

    /// Validates version and payload-size bounds.
    ///
    /// The oversize check is kept even though a `u16` field cannot exceed
    /// [`MAX_PAYLOAD_SIZE`] today; the constant governs the bound if the
    /// field is ever widened.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(self.version));
        }
        if self.payload_size as usize > MAX_PAYLOAD_SIZE {
            return Err(CodecError::OversizedPayload {
                declared: self.payload_size as usize,
            });
        }
        Ok(())
    }

    /// Encodes the header into its packed wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.version.to_le_bytes());
        buf[2] = self.type_id;
        buf[3..7].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        buf[7..9].copy_from_slice(&self.payload_size.to_le_bytes());
        buf
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes an [`Event`] into a complete frame (header + payload).
pub fn encode_event(event: &Event, timestamp_ms: u32) -> Vec<u8> {
    let payload = encode_payload(event);
    let header = FrameHeader {
        version: PROTOCOL_VERSION,
        type_id: event.event_type() as u8,
        timestamp_ms,
        payload_size: payload.len() as u16,
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(&payload);
    buf
}

fn encode_payload(event: &Event) -> Vec<u8> {
    let mut buf = Vec::new();
    match event {
        Event::MouseMove(m) => {
            buf.extend_from_slice(&m.x.to_le_bytes());
            buf.extend_from_slice(&m.y.to_le_bytes());
            buf.extend_from_slice(&m.dx.to_le_bytes());
            buf.extend_from_slice(&m.dy.to_le_bytes());
        }
        Event::MouseButton(m) => {
            buf.push(m.button as u8);
            buf.push(u8::from(m.pressed));
        }
        Event::MouseScroll(m) => {
            buf.extend_from_slice(&m.dx.to_le_bytes());
            buf.extend_from_slice(&m.dy.to_le_bytes());
        }
        Event::KeyPress(k) | Event::KeyRelease(k) => {
            buf.extend_from_slice(&k.vk.to_le_bytes());
            buf.extend_from_slice(&k.scan.to_le_bytes());
            buf.extend_from_slice(&k.flags.to_le_bytes());
        }
        Event::Clipboard => {}
        Event::Keepalive => {}
        Event::ScreenInfo(s) => {
            buf.extend_from_slice(&s.width.to_le_bytes());
            buf.extend_from_slice(&s.height.to_le_bytes());
            buf.extend_from_slice(&s.x.to_le_bytes());
            buf.extend_from_slice(&s.y.to_le_bytes());
        }
        Event::SwitchScreen(s) => {
            buf.push(s.edge as u8);
            buf.extend_from_slice(&s.position.to_le_bytes());
        }
    }
    buf
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes a payload for the given raw type byte.
///
/// Returns `Ok(None)` for an unknown type: the caller has already consumed
/// the declared payload, so the frame is simply skipped and the session
/// continues.
///
/// # Errors
///
/// Returns [`CodecError::UndersizedPayload`] when the payload is shorter
/// than the fixed size of the declared type. Bytes beyond the fixed size are
/// ignored.
pub fn decode_payload(type_id: u8, payload: &[u8]) -> Result<Option<Event>, CodecError> {
    let event_type = match EventType::try_from(type_id) {
        Ok(t) => t,
        Err(()) => return Ok(None),
    };

    let needed = event_type.fixed_payload_size();
    if payload.len() < needed {
        return Err(CodecError::UndersizedPayload {
            event_type,
            declared: payload.len(),
            needed,
        });
    }

    let event = match event_type {
        EventType::MouseMove => Event::MouseMove(MouseMoveEvent {
            x: read_i32(payload, 0),
            y: read_i32(payload, 4),
            dx: read_i32(payload, 8),
            dy: read_i32(payload, 12),
        }),
        EventType::MouseButton => {
            let button = match MouseButton::try_from(payload[0]) {
                Ok(b) => b,
                // Unknown button codes are treated like unknown types: skip.
                Err(()) => return Ok(None),
            };
            Event::MouseButton(MouseButtonEvent {
                button,
                pressed: payload[1] != 0,
            })
        }
        EventType::MouseScroll => Event::MouseScroll(MouseScrollEvent {
            dx: read_i32(payload, 0),
            dy: read_i32(payload, 4),
        }),
        EventType::KeyPress => Event::KeyPress(read_key(payload)),
        EventType::KeyRelease => Event::KeyRelease(read_key(payload)),
        EventType::Clipboard => Event::Clipboard,
        EventType::Keepalive => Event::Keepalive,
        EventType::ScreenInfo => Event::ScreenInfo(ScreenInfoEvent {
            width: read_i32(payload, 0),
            height: read_i32(payload, 4),
            x: read_i32(payload, 8),
            y: read_i32(payload, 12),
        }),
        EventType::SwitchScreen => {
            let edge = ScreenEdge::try_from(payload[0]).unwrap_or(ScreenEdge::None);
            Event::SwitchScreen(SwitchScreenEvent {
                edge,
                position: read_i32(payload, 1),
            })
        }
    };
    Ok(Some(event))
}

/// Decodes one complete frame from the beginning of `bytes`.
///
/// Returns the decoded event (`None` for an unknown type) and the total
/// number of bytes consumed, so the caller can advance its read cursor.
///
/// # Errors
///
/// Returns [`CodecError`] if the header is invalid or the buffer does not
/// hold the declared payload.
pub fn decode_frame(bytes: &[u8]) -> Result<(Option<Event>, usize), CodecError> {
    let header = FrameHeader::decode(bytes)?;
    let total = HEADER_SIZE + header.payload_size as usize;
    if bytes.len() < total {
        return Err(CodecError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    let event = decode_payload(header.type_id, &bytes[HEADER_SIZE..total])?;
    Ok((event, total))
}

// ── Little-endian read helpers ────────────────────────────────────────────────

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_key(payload: &[u8]) -> KeyEvent {
    KeyEvent {
        vk: read_u32(payload, 0),
        scan: read_u32(payload, 4),
        flags: read_u32(payload, 8),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(event: &Event) -> Event {
        let encoded = encode_event(event, 12345);
        let (decoded, consumed) = decode_frame(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal frame size");
        decoded.expect("known type must decode to an event")
    }

    // ── Round trips ───────────────────────────────────────────────────────────

    #[test]
    fn test_mouse_move_round_trip() {
        let ev = Event::MouseMove(MouseMoveEvent { x: 1919, y: 540, dx: 1, dy: 0 });
        assert_eq!(round_trip(&ev), ev);
    }

    #[test]
    fn test_mouse_move_round_trip_at_i32_boundaries() {
        let ev = Event::MouseMove(MouseMoveEvent {
            x: i32::MIN,
            y: i32::MAX,
            dx: i32::MAX,
            dy: i32::MIN,
        });
        assert_eq!(round_trip(&ev), ev);
    }

    #[test]
    fn test_mouse_button_round_trip_all_buttons() {
        for button in [
            MouseButton::Left,
            MouseButton::Middle,
            MouseButton::Right,
            MouseButton::X1,
            MouseButton::X2,
        ] {
            for pressed in [true, false] {
                let ev = Event::MouseButton(MouseButtonEvent { button, pressed });
                assert_eq!(round_trip(&ev), ev);
            }
        }
    }

    #[test]
    fn test_mouse_scroll_round_trip_negative_deltas() {
        let ev = Event::MouseScroll(MouseScrollEvent { dx: -3, dy: i32::MIN });
        assert_eq!(round_trip(&ev), ev);
    }

    #[test]
    fn test_key_press_and_release_round_trip() {
        let key = KeyEvent { vk: 0x2E, scan: 0x53, flags: u32::MAX };
        assert_eq!(round_trip(&Event::KeyPress(key)), Event::KeyPress(key));
        assert_eq!(round_trip(&Event::KeyRelease(key)), Event::KeyRelease(key));
    }

    #[test]
    fn test_keepalive_round_trip_is_header_only() {
        let encoded = encode_event(&Event::Keepalive, 0);
        assert_eq!(encoded.len(), HEADER_SIZE);
        assert_eq!(round_trip(&Event::Keepalive), Event::Keepalive);
    }

    #[test]
    fn test_screen_info_round_trip() {
        let ev = Event::ScreenInfo(ScreenInfoEvent { width: 2560, height: 1440, x: 0, y: 0 });
        assert_eq!(round_trip(&ev), ev);
    }

    #[test]
    fn test_switch_screen_round_trip_every_edge() {
        for edge in [
            ScreenEdge::None,
            ScreenEdge::Left,
            ScreenEdge::Right,
            ScreenEdge::Top,
            ScreenEdge::Bottom,
        ] {
            let ev = Event::SwitchScreen(SwitchScreenEvent { edge, position: -42 });
            assert_eq!(round_trip(&ev), ev);
        }
    }

    // ── Header layout ─────────────────────────────────────────────────────────

    #[test]
    fn test_header_fields_are_little_endian_at_fixed_offsets() {
        let encoded = encode_event(&Event::Keepalive, 0x0102_0304);
        assert_eq!(u16::from_le_bytes([encoded[0], encoded[1]]), PROTOCOL_VERSION);
        assert_eq!(encoded[2], EventType::Keepalive as u8);
        assert_eq!(
            u32::from_le_bytes([encoded[3], encoded[4], encoded[5], encoded[6]]),
            0x0102_0304
        );
        assert_eq!(u16::from_le_bytes([encoded[7], encoded[8]]), 0);
    }

    #[test]
    fn test_header_decode_reads_back_encoded_fields() {
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            type_id: 4,
            timestamp_ms: u32::MAX,
            payload_size: 12,
        };
        assert_eq!(FrameHeader::decode(&header.encode()), Ok(header));
    }

    // ── Rejection paths ───────────────────────────────────────────────────────

    #[test]
    fn test_decode_rejects_wrong_version() {
        let mut bytes = encode_event(&Event::Keepalive, 0);
        bytes[0..2].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(
            decode_frame(&bytes),
            Err(CodecError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_decode_rejects_short_header() {
        let result = decode_frame(&[1, 0, 7]);
        assert!(matches!(result, Err(CodecError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_rejects_undersized_payload_for_type() {
        // Declare a MOUSE_MOVE with only 4 payload bytes instead of 16.
        let mut bytes = FrameHeader {
            version: PROTOCOL_VERSION,
            type_id: EventType::MouseMove as u8,
            timestamp_ms: 0,
            payload_size: 4,
        }
        .encode()
        .to_vec();
        bytes.extend_from_slice(&[0; 4]);

        assert_eq!(
            decode_frame(&bytes),
            Err(CodecError::UndersizedPayload {
                event_type: EventType::MouseMove,
                declared: 4,
                needed: 16,
            })
        );
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let mut bytes = encode_event(
            &Event::MouseMove(MouseMoveEvent { x: 0, y: 0, dx: 0, dy: 0 }),
            0,
        );
        bytes.truncate(HEADER_SIZE + 3);
        assert!(matches!(
            decode_frame(&bytes),
            Err(CodecError::InsufficientData { .. })
        ));
    }

    // ── Soft errors ───────────────────────────────────────────────────────────

    #[test]
    fn test_unknown_type_is_skipped_with_payload_consumed() {
        let mut bytes = FrameHeader {
            version: PROTOCOL_VERSION,
            type_id: 0x7F,
            timestamp_ms: 0,
            payload_size: 5,
        }
        .encode()
        .to_vec();
        bytes.extend_from_slice(&[1, 2, 3, 4, 5]);

        let (event, consumed) = decode_frame(&bytes).expect("unknown type is not fatal");
        assert_eq!(event, None);
        assert_eq!(consumed, HEADER_SIZE + 5);
    }

    #[test]
    fn test_extra_payload_bytes_are_ignored() {
        let mut bytes = FrameHeader {
            version: PROTOCOL_VERSION,
            type_id: EventType::MouseScroll as u8,
            timestamp_ms: 0,
            payload_size: 12,
        }
        .encode()
        .to_vec();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&[0xAA; 4]); // trailing bytes a newer sender might add

        let (event, consumed) = decode_frame(&bytes).expect("decode failed");
        assert_eq!(
            event,
            Some(Event::MouseScroll(MouseScrollEvent { dx: 1, dy: -1 }))
        );
        assert_eq!(consumed, HEADER_SIZE + 12);
    }

    #[test]
    fn test_clipboard_payload_is_accepted_and_discarded() {
        let mut bytes = FrameHeader {
            version: PROTOCOL_VERSION,
            type_id: EventType::Clipboard as u8,
            timestamp_ms: 0,
            payload_size: 7,
        }
        .encode()
        .to_vec();
        bytes.extend_from_slice(b"ignored");

        let (event, consumed) = decode_frame(&bytes).expect("decode failed");
        assert_eq!(event, Some(Event::Clipboard));
        assert_eq!(consumed, HEADER_SIZE + 7);
    }
}
