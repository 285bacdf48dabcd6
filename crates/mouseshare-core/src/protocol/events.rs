//! Protocol event types and payload structs.
//!
//! Every frame on the session stream is a [`FrameHeader`](super::codec::FrameHeader)
//! followed by one fixed-layout payload. All multi-byte integers are
//! little-endian on the wire.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version carried in every frame header.
pub const PROTOCOL_VERSION: u16 = 1;

/// Size of the packed frame header in bytes:
/// `version:u16 + type:u8 + timestamp_ms:u32 + payload_size:u16`.
pub const HEADER_SIZE: usize = 9;

/// Upper bound a receiver accepts for the declared payload size.
pub const MAX_PAYLOAD_SIZE: usize = 65535;

/// Default TCP service port for sessions.
pub const DEFAULT_PORT: u16 = 24800;

/// Default UDP port for the discovery beacon.
pub const DEFAULT_DISCOVERY_PORT: u16 = 24801;

// ── Event type codes ──────────────────────────────────────────────────────────

/// All event type codes defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    MouseMove = 1,
    MouseButton = 2,
    MouseScroll = 3,
    KeyPress = 4,
    KeyRelease = 5,
    /// Reserved; receivers accept and ignore the payload.
    Clipboard = 6,
    Keepalive = 7,
    ScreenInfo = 8,
    SwitchScreen = 9,
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            1 => Ok(EventType::MouseMove),
            2 => Ok(EventType::MouseButton),
            3 => Ok(EventType::MouseScroll),
            4 => Ok(EventType::KeyPress),
            5 => Ok(EventType::KeyRelease),
            6 => Ok(EventType::Clipboard),
            7 => Ok(EventType::Keepalive),
            8 => Ok(EventType::ScreenInfo),
            9 => Ok(EventType::SwitchScreen),
            _ => Err(()),
        }
    }
}

impl EventType {
    /// Fixed payload size in bytes for this type. `Clipboard` is variable
    /// (reserved) and reports 0, its minimum.
    pub fn fixed_payload_size(self) -> usize {
        match self {
            EventType::MouseMove => 16,
            EventType::MouseButton => 2,
            EventType::MouseScroll => 8,
            EventType::KeyPress | EventType::KeyRelease => 12,
            EventType::Clipboard => 0,
            EventType::Keepalive => 0,
            EventType::ScreenInfo => 16,
            EventType::SwitchScreen => 5,
        }
    }
}

// ── Mouse buttons and screen edges ────────────────────────────────────────────

/// Mouse button identifier as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 1,
    Middle = 2,
    Right = 3,
    X1 = 4,
    X2 = 5,
}

impl TryFrom<u8> for MouseButton {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            1 => Ok(MouseButton::Left),
            2 => Ok(MouseButton::Middle),
            3 => Ok(MouseButton::Right),
            4 => Ok(MouseButton::X1),
            5 => Ok(MouseButton::X2),
            _ => Err(()),
        }
    }
}

/// One of the four screen edges, or none.
///
/// Used both in `SWITCH_SCREEN` payloads and in the layout geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScreenEdge {
    None = 0,
    Left = 1,
    Right = 2,
    Top = 3,
    Bottom = 4,
}

impl TryFrom<u8> for ScreenEdge {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(ScreenEdge::None),
            1 => Ok(ScreenEdge::Left),
            2 => Ok(ScreenEdge::Right),
            3 => Ok(ScreenEdge::Top),
            4 => Ok(ScreenEdge::Bottom),
            _ => Err(()),
        }
    }
}

impl ScreenEdge {
    /// The edge a cursor leaving through `self` enters on the neighbor.
    pub fn opposite(self) -> ScreenEdge {
        match self {
            ScreenEdge::Left => ScreenEdge::Right,
            ScreenEdge::Right => ScreenEdge::Left,
            ScreenEdge::Top => ScreenEdge::Bottom,
            ScreenEdge::Bottom => ScreenEdge::Top,
            ScreenEdge::None => ScreenEdge::None,
        }
    }
}

// ── Payload structs ───────────────────────────────────────────────────────────

/// MOUSE_MOVE (1): absolute position plus relative deltas.
///
/// The absolute `x, y` are advisory; the relative `dx, dy` are authoritative
/// on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMoveEvent {
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

/// MOUSE_BUTTON (2): button press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButtonEvent {
    pub button: MouseButton,
    pub pressed: bool,
}

/// MOUSE_SCROLL (3): wheel movement in units of one notch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseScrollEvent {
    pub dx: i32,
    pub dy: i32,
}

/// KEY_PRESS (4) / KEY_RELEASE (5): a keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Virtual key code.
    pub vk: u32,
    /// Hardware scan code.
    pub scan: u32,
    /// Platform key flags, forwarded verbatim.
    pub flags: u32,
}

/// SCREEN_INFO (8): the sender's primary screen geometry.
///
/// `x, y` are the screen's position in a virtual desktop; they are reserved
/// and receivers ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfoEvent {
    pub width: i32,
    pub height: i32,
    pub x: i32,
    pub y: i32,
}

/// SWITCH_SCREEN (9): instructs the target to take over input.
///
/// `edge` is the edge the cursor *enters* on the target; `position` is the
/// perpendicular coordinate along that edge in the sender's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchScreenEvent {
    pub edge: ScreenEdge,
    pub position: i32,
}

// ── Top-level event enum ──────────────────────────────────────────────────────

/// All protocol events, discriminated by [`EventType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    MouseMove(MouseMoveEvent),
    MouseButton(MouseButtonEvent),
    MouseScroll(MouseScrollEvent),
    KeyPress(KeyEvent),
    KeyRelease(KeyEvent),
    /// Reserved: decoded with its payload discarded.
    Clipboard,
    Keepalive,
    ScreenInfo(ScreenInfoEvent),
    SwitchScreen(SwitchScreenEvent),
}

impl Event {
    /// Returns the [`EventType`] discriminant for this event.
    pub fn event_type(&self) -> EventType {
        match self {
            Event::MouseMove(_) => EventType::MouseMove,
            Event::MouseButton(_) => EventType::MouseButton,
            Event::MouseScroll(_) => EventType::MouseScroll,
            Event::KeyPress(_) => EventType::KeyPress,
            Event::KeyRelease(_) => EventType::KeyRelease,
            Event::Clipboard => EventType::Clipboard,
            Event::Keepalive => EventType::Keepalive,
            Event::ScreenInfo(_) => EventType::ScreenInfo,
            Event::SwitchScreen(_) => EventType::SwitchScreen,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
