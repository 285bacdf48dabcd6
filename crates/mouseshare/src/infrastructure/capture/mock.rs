//! Mock capture port for unit tests and headless builds.
//!
//! Lets tests inject synthetic [`CapturedEvent`]s and observe the capture
//! flag and cursor warps without OS hooks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Mutex,
};

use super::{CaptureError, CapturePort, CapturedEvent};

/// A recording [`CapturePort`] implementation.
pub struct MockCapturePort {
    sender: Mutex<Option<Sender<CapturedEvent>>>,
    captured: AtomicBool,
    warps: Mutex<Vec<(i32, i32)>>,
}

impl MockCapturePort {
    pub fn new() -> Self {
        Self {
            sender: Mutex::new(None),
            captured: AtomicBool::new(false),
            warps: Mutex::new(Vec::new()),
        }
    }

    /// Injects a synthetic event, as if captured from hardware.
    ///
    /// Panics if `start()` has not been called.
    pub fn inject(&self, event: CapturedEvent) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx.send(event).expect("receiver dropped"),
            None => panic!("MockCapturePort::inject called before start()"),
        }
    }

    /// All cursor warps requested so far.
    pub fn warps(&self) -> Vec<(i32, i32)> {
        self.warps.lock().expect("lock poisoned").clone()
    }

    /// The most recent cursor warp, if any.
    pub fn last_warp(&self) -> Option<(i32, i32)> {
        self.warps.lock().expect("lock poisoned").last().copied()
    }
}

impl Default for MockCapturePort {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturePort for MockCapturePort {
    fn start(&self) -> Result<mpsc::Receiver<CapturedEvent>, CaptureError> {
        let mut guard = self.sender.lock().expect("lock poisoned");
        if guard.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel();
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        *self.sender.lock().expect("lock poisoned") = None;
        self.captured.store(false, Ordering::SeqCst);
    }

    fn capture_input(&self, capture: bool) {
        self.captured.store(capture, Ordering::SeqCst);
    }

    fn is_captured(&self) -> bool {
        self.captured.load(Ordering::SeqCst)
    }

    fn warp_cursor(&self, x: i32, y: i32) {
        self.warps.lock().expect("lock poisoned").push((x, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_delivers_events_in_order() {
        let port = MockCapturePort::new();
        let rx = port.start().unwrap();

        port.inject(CapturedEvent::MouseMove { x: 1, y: 2, dx: 1, dy: 0 });
        port.inject(CapturedEvent::MouseScroll { dx: 0, dy: -1 });

        assert!(matches!(rx.recv().unwrap(), CapturedEvent::MouseMove { x: 1, .. }));
        assert!(matches!(rx.recv().unwrap(), CapturedEvent::MouseScroll { dy: -1, .. }));
    }

    #[test]
    fn test_second_start_fails() {
        let port = MockCapturePort::new();
        let _rx = port.start().unwrap();
        assert!(matches!(port.start(), Err(CaptureError::AlreadyStarted)));
    }

    #[test]
    fn test_stop_closes_channel_and_releases_capture() {
        let port = MockCapturePort::new();
        let rx = port.start().unwrap();
        port.capture_input(true);

        port.stop();

        assert!(rx.recv().is_err(), "channel must close on stop");
        assert!(!port.is_captured(), "stop must always release capture");
    }

    #[test]
    fn test_capture_flag_and_warps_are_observable() {
        let port = MockCapturePort::new();
        port.capture_input(true);
        assert!(port.is_captured());

        port.warp_cursor(960, 540);
        port.warp_cursor(10, 20);
        assert_eq!(port.warps(), vec![(960, 540), (10, 20)]);
        assert_eq!(port.last_warp(), Some((10, 20)));
    }
}
