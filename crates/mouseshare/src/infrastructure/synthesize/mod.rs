//! Input synthesis port for the target role.
//!
//! Production backends inject OS input events (`SendInput` on Windows, XTest
//! on X11, CoreGraphics on macOS); those are host-provided. This module
//! defines the capability surface the apply pipeline consumes plus the mock
//! used by tests and headless builds.

use mouseshare_core::MouseButton;

pub mod mock;

/// Error type for synthesis operations.
#[derive(Debug, thiserror::Error)]
pub enum SynthesizeError {
    #[error("platform injection failed: {0}")]
    Platform(String),
}

/// The synthesis capability consumed by the apply pipeline.
pub trait SynthesizePort: Send + Sync {
    /// Moves the cursor to an absolute position. Callers pass
    /// already-clamped coordinates.
    fn move_mouse(&self, x: i32, y: i32) -> Result<(), SynthesizeError>;

    /// Moves the cursor by a relative delta.
    fn move_mouse_relative(&self, dx: i32, dy: i32) -> Result<(), SynthesizeError>;

    fn mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), SynthesizeError>;

    fn mouse_scroll(&self, dx: i32, dy: i32) -> Result<(), SynthesizeError>;

    fn key_event(&self, vk: u32, scan: u32, flags: u32, pressed: bool)
        -> Result<(), SynthesizeError>;
}
