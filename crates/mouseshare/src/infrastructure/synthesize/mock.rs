//! Recording synthesize port for unit tests.

use std::sync::Mutex;

use mouseshare_core::MouseButton;

use super::{SynthesizeError, SynthesizePort};

/// Everything a test might want to assert about injected input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesized {
    Move(i32, i32),
    MoveRelative(i32, i32),
    Button(MouseButton, bool),
    Scroll(i32, i32),
    Key { vk: u32, pressed: bool },
}

/// A [`SynthesizePort`] that records every call.
#[derive(Default)]
pub struct MockSynthesizePort {
    calls: Mutex<Vec<Synthesized>>,
    /// When set, every call fails; exercises the pipeline's error paths.
    pub fail: bool,
}

impl MockSynthesizePort {
    pub fn new() -> Self {
        Self::default()
    }

    /// A port whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Synthesized> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// The cursor positions of all absolute moves, in order.
    pub fn moves(&self) -> Vec<(i32, i32)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Synthesized::Move(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Synthesized) -> Result<(), SynthesizeError> {
        if self.fail {
            return Err(SynthesizeError::Platform("injected failure".to_string()));
        }
        self.calls.lock().expect("lock poisoned").push(call);
        Ok(())
    }
}

impl SynthesizePort for MockSynthesizePort {
    fn move_mouse(&self, x: i32, y: i32) -> Result<(), SynthesizeError> {
        self.record(Synthesized::Move(x, y))
    }

    fn move_mouse_relative(&self, dx: i32, dy: i32) -> Result<(), SynthesizeError> {
        self.record(Synthesized::MoveRelative(dx, dy))
    }

    fn mouse_button(&self, button: MouseButton, pressed: bool) -> Result<(), SynthesizeError> {
        self.record(Synthesized::Button(button, pressed))
    }

    fn mouse_scroll(&self, dx: i32, dy: i32) -> Result<(), SynthesizeError> {
        self.record(Synthesized::Scroll(dx, dy))
    }

    fn key_event(
        &self,
        vk: u32,
        _scan: u32,
        _flags: u32,
        pressed: bool,
    ) -> Result<(), SynthesizeError> {
        self.record(Synthesized::Key { vk, pressed })
    }
}
