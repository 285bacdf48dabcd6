//! Input capture port for the controller role.
//!
//! A production backend installs low-level OS hooks (WH_MOUSE_LL /
//! WH_KEYBOARD_LL on Windows) on a dedicated message-loop thread; hook
//! callbacks must return quickly, so raw events are pushed into a channel and
//! consumed by the async runtime. That backend is host-provided; this module
//! defines the capability surface the pipeline consumes plus the mock used by
//! tests and headless builds.
//!
//! The capture flag is the hard contract: while `capture_input(true)` is in
//! effect, raw events must not reach the local OS, with the exception of the
//! emergency keys, which a conforming backend always passes through.

use std::sync::mpsc;

pub mod mock;

/// Virtual-key codes the pipeline inspects. Values follow the Windows VK
/// table, which is also what the wire protocol carries.
pub mod vk {
    pub const TAB: u32 = 0x09;
    pub const SHIFT: u32 = 0x10;
    pub const CONTROL: u32 = 0x11;
    pub const MENU: u32 = 0x12; // Alt
    pub const ESCAPE: u32 = 0x1B;
    pub const DELETE: u32 = 0x2E;
    pub const LWIN: u32 = 0x5B;
    pub const RWIN: u32 = 0x5C;
    pub const F4: u32 = 0x73;
    pub const SCROLL_LOCK: u32 = 0x91;
    pub const LSHIFT: u32 = 0xA0;
    pub const RSHIFT: u32 = 0xA1;
    pub const LCONTROL: u32 = 0xA2;
    pub const RCONTROL: u32 = 0xA3;
    pub const LMENU: u32 = 0xA4;
    pub const RMENU: u32 = 0xA5;
}

/// A raw input event produced by the capture backend.
///
/// One variant-valued event to one handler; the pipeline keeps all state
/// transitions in a single place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturedEvent {
    /// Cursor motion: absolute position plus the relative delta.
    MouseMove { x: i32, y: i32, dx: i32, dy: i32 },
    MouseButton {
        button: mouseshare_core::MouseButton,
        pressed: bool,
    },
    MouseScroll { dx: i32, dy: i32 },
    Key {
        vk: u32,
        scan: u32,
        flags: u32,
        pressed: bool,
    },
}

/// Error type for capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to install input hook: {0}")]
    HookInstallFailed(String),
    #[error("capture port has already been started")]
    AlreadyStarted,
}

/// The capture capability consumed by the forward pipeline.
///
/// Implementations must be callable from any thread: `capture_input` and
/// `warp_cursor` are invoked from both the event-pump task and the session
/// loop's watchdog tick.
pub trait CapturePort: Send + Sync {
    /// Starts the backend and returns the raw event stream.
    fn start(&self) -> Result<mpsc::Receiver<CapturedEvent>, CaptureError>;

    /// Stops the backend and releases all OS resources. Always releases the
    /// capture flag.
    fn stop(&self);

    /// When `true`, raw events from subsequent input must not reach the
    /// local OS (emergency keys excepted).
    fn capture_input(&self, capture: bool);

    /// Whether local delivery is currently blocked.
    fn is_captured(&self) -> bool;

    /// Moves the physical cursor to `(x, y)` in local screen coordinates.
    fn warp_cursor(&self, x: i32, y: i32);
}
