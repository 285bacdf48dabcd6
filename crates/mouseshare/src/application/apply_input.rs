//! The target's synthesize pipeline.
//!
//! Consumes decoded session events and drives the local OS through the
//! [`SynthesizePort`]. Keeps its own cursor position: the controller's
//! relative deltas are authoritative, the absolute coordinates advisory, and
//! the internal cursor is clamped to the local screen after every step so
//! injected positions can never leave `[0, W-1] × [0, H-1]`.
//!
//! Control returns to the controller implicitly: when an accumulated move
//! lands back on the edge the cursor entered through, the pipeline
//! deactivates and recenters. No frame is sent back; the controller's own
//! edge logic and watchdog handle its side.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use mouseshare_core::{clamp_to, entry_position, Event, ScreenEdge};

use crate::infrastructure::synthesize::{SynthesizeError, SynthesizePort};

/// Remote screen size assumed until a `SCREEN_INFO` arrives.
const DEFAULT_REMOTE_SCREEN: (i32, i32) = (1920, 1080);

/// Error type for the apply pipeline.
///
/// Synthesis failures are not session-fatal; the session loop logs them and
/// keeps dispatching.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("synthesis error: {0}")]
    Synthesize(#[from] SynthesizeError),
}

/// The apply-input use case.
pub struct ApplyInput {
    synth: Arc<dyn SynthesizePort>,
    local_w: i32,
    local_h: i32,
    remote_w: i32,
    remote_h: i32,
    cursor_x: i32,
    cursor_y: i32,
    active: bool,
    entry_edge: ScreenEdge,
}

impl ApplyInput {
    pub fn new(synth: Arc<dyn SynthesizePort>, local_w: i32, local_h: i32) -> Self {
        Self {
            synth,
            local_w,
            local_h,
            remote_w: DEFAULT_REMOTE_SCREEN.0,
            remote_h: DEFAULT_REMOTE_SCREEN.1,
            cursor_x: local_w / 2,
            cursor_y: local_h / 2,
            active: false,
            entry_edge: ScreenEdge::None,
        }
    }

    /// Whether received input is currently being applied.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The internal cursor position.
    pub fn cursor(&self) -> (i32, i32) {
        (self.cursor_x, self.cursor_y)
    }

    /// The remote screen size learned from `SCREEN_INFO`.
    pub fn remote_screen(&self) -> (i32, i32) {
        (self.remote_w, self.remote_h)
    }

    /// Applies one decoded session event.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::Synthesize`] when OS injection fails.
    pub fn handle_event(&mut self, event: &Event) -> Result<(), ApplyError> {
        match event {
            Event::ScreenInfo(info) => {
                // The virtual-desktop offset fields are reserved; only the
                // dimensions are meaningful.
                self.remote_w = info.width;
                self.remote_h = info.height;
                info!("controller screen: {}x{}", info.width, info.height);
                Ok(())
            }
            Event::SwitchScreen(sw) => {
                self.activate(sw.edge, sw.position)?;
                Ok(())
            }
            Event::MouseMove(mv) => self.apply_motion(mv.dx, mv.dy),
            Event::MouseButton(btn) if self.active => {
                self.synth.mouse_button(btn.button, btn.pressed)?;
                Ok(())
            }
            Event::MouseScroll(scroll) if self.active => {
                self.synth.mouse_scroll(scroll.dx, scroll.dy)?;
                Ok(())
            }
            Event::KeyPress(key) if self.active => {
                self.synth.key_event(key.vk, key.scan, key.flags, true)?;
                Ok(())
            }
            Event::KeyRelease(key) if self.active => {
                self.synth.key_event(key.vk, key.scan, key.flags, false)?;
                Ok(())
            }
            Event::Keepalive | Event::Clipboard => Ok(()),
            _ => {
                debug!("dropping {:?} while inactive", event.event_type());
                Ok(())
            }
        }
    }

    /// Seeds the cursor on the entry edge and starts applying input.
    ///
    /// The position is scaled from the controller's cross-axis onto ours,
    /// then clamped into the screen.
    fn activate(&mut self, edge: ScreenEdge, position: i32) -> Result<(), ApplyError> {
        self.active = true;
        self.entry_edge = edge;

        let (x, y) = entry_position(
            edge,
            position,
            self.remote_w,
            self.remote_h,
            self.local_w,
            self.local_h,
        );
        self.cursor_x = x;
        self.cursor_y = y;
        self.synth.move_mouse(x, y)?;
        info!("input active, entry edge {edge:?}, cursor at ({x}, {y})");
        Ok(())
    }

    fn apply_motion(&mut self, dx: i32, dy: i32) -> Result<(), ApplyError> {
        if !self.active {
            return Ok(());
        }

        let (x, y) = clamp_to(
            self.local_w,
            self.local_h,
            self.cursor_x.saturating_add(dx),
            self.cursor_y.saturating_add(dy),
        );
        self.cursor_x = x;
        self.cursor_y = y;
        self.synth.move_mouse(x, y)?;

        if self.at_entry_edge() {
            self.deactivate_and_recenter()?;
        }
        Ok(())
    }

    fn at_entry_edge(&self) -> bool {
        match self.entry_edge {
            ScreenEdge::Left => self.cursor_x <= 0,
            ScreenEdge::Right => self.cursor_x >= self.local_w - 1,
            ScreenEdge::Top => self.cursor_y <= 0,
            ScreenEdge::Bottom => self.cursor_y >= self.local_h - 1,
            ScreenEdge::None => false,
        }
    }

    /// Returns control to the controller side. Recentering prevents
    /// re-entry jitter on the next activation.
    fn deactivate_and_recenter(&mut self) -> Result<(), ApplyError> {
        self.active = false;
        self.cursor_x = self.local_w / 2;
        self.cursor_y = self.local_h / 2;
        self.synth.move_mouse(self.cursor_x, self.cursor_y)?;
        info!("cursor returned through {:?} edge; input inactive", self.entry_edge);
        Ok(())
    }

    /// Resets session-scoped state; run when a session ends.
    pub fn reset(&mut self) {
        self.active = false;
        self.entry_edge = ScreenEdge::None;
        self.remote_w = DEFAULT_REMOTE_SCREEN.0;
        self.remote_h = DEFAULT_REMOTE_SCREEN.1;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
