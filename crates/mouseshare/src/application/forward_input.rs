//! The controller's capture pipeline.
//!
//! Receives raw hook events, decides who is driving, and forwards events to
//! the target while control is remote. This is the heart of the controller:
//!
//! ```text
//! OS hook (host-provided backend)
//!   └─ CapturedEvent over mpsc channel
//!        └─ ForwardInput::handle_event()
//!             ├─ Track modifier state (chord detection)
//!             ├─ ScrollLock / Ctrl+Alt+Esc: flip control state
//!             ├─ Emergency keys: observe, never forward
//!             ├─ LOCAL: edge detection against the peer layout
//!             │    └─ switch_to_remote(): capture on, SWITCH_SCREEN out,
//!             │       cursor warped to screen center
//!             └─ REMOTE: serialize the event onto the session
//! ```
//!
//! Control state is a shared atomic: the session loop's watchdog tick and
//! any teardown path can force a release without going through the pipeline.
//! The invariant everything here protects: a transport send failure flips
//! control back to LOCAL *before* the error leaves `handle_event`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use mouseshare_core::{
    edge_hit, Event, KeyEvent, MouseButtonEvent, MouseMoveEvent, MouseScrollEvent, PeerTable,
    ScreenEdge, SwitchScreenEvent,
};

use crate::infrastructure::capture::{vk, CapturePort, CapturedEvent};
use crate::infrastructure::network::transport::timestamp_ms;

/// How long REMOTE may go without any observed input before the watchdog
/// forces control back to LOCAL.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Error type for the forward pipeline.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The event sink failed to deliver; the session is gone. Control has
    /// already been released to LOCAL by the time this surfaces.
    #[error("transmit error: {0}")]
    Transmit(String),
}

/// Trait for delivering events to the connected target.
///
/// The transport's session writer is the production implementation; tests
/// record calls instead.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: &Event) -> Result<(), String>;
}

// ── Control handle ────────────────────────────────────────────────────────────

/// Shared control state: LOCAL vs REMOTE plus the activity clock.
///
/// The hook-side pipeline owns the only transitions *into* REMOTE;
/// transitions to LOCAL are idempotent and safe from any task. Releasing
/// always clears the capture flag, whatever state we thought we were in.
pub struct ControlHandle {
    remote: AtomicBool,
    last_activity_ms: AtomicU64,
    capture: Arc<dyn CapturePort>,
}

impl ControlHandle {
    pub fn new(capture: Arc<dyn CapturePort>) -> Self {
        Self {
            remote: AtomicBool::new(false),
            last_activity_ms: AtomicU64::new(timestamp_ms() as u64),
            capture,
        }
    }

    /// `true` while the remote peer is being driven.
    pub fn is_remote(&self) -> bool {
        self.remote.load(Ordering::SeqCst)
    }

    /// Records input activity for the watchdog.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(timestamp_ms() as u64, Ordering::Relaxed);
    }

    fn enter_remote(&self) {
        self.remote.store(true, Ordering::SeqCst);
        self.capture.capture_input(true);
        self.touch();
    }

    /// Forces control back to LOCAL and releases capture. Idempotent.
    pub fn release_to_local(&self) {
        let was_remote = self.remote.swap(false, Ordering::SeqCst);
        self.capture.capture_input(false);
        if was_remote {
            info!("control returned to local");
        }
    }

    /// Releases control if REMOTE has seen no input for `timeout`.
    /// Returns `true` when the watchdog fired.
    pub fn check_watchdog(&self, timeout: Duration) -> bool {
        if !self.is_remote() {
            return false;
        }
        let idle_ms =
            (timestamp_ms() as u64).saturating_sub(self.last_activity_ms.load(Ordering::Relaxed));
        if idle_ms >= timeout.as_millis() as u64 {
            warn!("no input for {idle_ms} ms while remote; releasing capture");
            self.release_to_local();
            true
        } else {
            false
        }
    }
}

// ── The pipeline ──────────────────────────────────────────────────────────────

/// The forward-input use case.
pub struct ForwardInput {
    screen_w: i32,
    screen_h: i32,
    peers: Arc<Mutex<PeerTable>>,
    sink: Arc<dyn EventSink>,
    capture: Arc<dyn CapturePort>,
    control: Arc<ControlHandle>,
    ctrl_down: bool,
    alt_down: bool,
    shift_down: bool,
}

impl ForwardInput {
    pub fn new(
        screen_w: i32,
        screen_h: i32,
        peers: Arc<Mutex<PeerTable>>,
        sink: Arc<dyn EventSink>,
        capture: Arc<dyn CapturePort>,
    ) -> Self {
        let control = Arc::new(ControlHandle::new(Arc::clone(&capture)));
        Self {
            screen_w,
            screen_h,
            peers,
            sink,
            capture,
            control,
            ctrl_down: false,
            alt_down: false,
            shift_down: false,
        }
    }

    /// The shared control handle, for the session loop's watchdog tick and
    /// for teardown paths.
    pub fn control(&self) -> Arc<ControlHandle> {
        Arc::clone(&self.control)
    }

    /// Handles one raw event from the capture port.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::Transmit`] when the session send fails;
    /// control has been forced back to LOCAL before the error returns.
    pub async fn handle_event(&mut self, event: CapturedEvent) -> Result<(), ForwardError> {
        self.control.touch();

        match event {
            CapturedEvent::MouseMove { x, y, dx, dy } => self.handle_mouse_move(x, y, dx, dy).await,
            CapturedEvent::MouseButton { button, pressed } => {
                if self.control.is_remote() {
                    self.forward(Event::MouseButton(MouseButtonEvent { button, pressed }))
                        .await
                } else {
                    Ok(())
                }
            }
            CapturedEvent::MouseScroll { dx, dy } => {
                if self.control.is_remote() {
                    self.forward(Event::MouseScroll(MouseScrollEvent { dx, dy })).await
                } else {
                    Ok(())
                }
            }
            CapturedEvent::Key { vk, scan, flags, pressed } => {
                self.handle_key(vk, scan, flags, pressed).await
            }
        }
    }

    // ── Mouse motion and edge detection ───────────────────────────────────────

    async fn handle_mouse_move(
        &mut self,
        x: i32,
        y: i32,
        dx: i32,
        dy: i32,
    ) -> Result<(), ForwardError> {
        if self.control.is_remote() {
            return self
                .forward(Event::MouseMove(MouseMoveEvent { x, y, dx, dy }))
                .await;
        }

        let Some((edge, position)) = edge_hit(x, y, self.screen_w, self.screen_h) else {
            return Ok(());
        };

        // Lock scope: the layout mutex is never held across the send.
        let neighbor = {
            let table = self.peers.lock().expect("peer table lock poisoned");
            table.neighbor_at(edge, position).map(|p| p.name.clone())
        };

        match neighbor {
            Some(name) => {
                info!("cursor crossed {edge:?} edge at {position}; switching to {name}");
                self.switch_to_remote(edge, position).await
            }
            None => {
                debug!("edge {edge:?} touched at {position} but no connected neighbor abuts");
                Ok(())
            }
        }
    }

    /// The LOCAL → REMOTE transition.
    ///
    /// Order matters: state first (so the hook starts blocking), then the
    /// switch frame (whose `edge` is the *entry* edge on the target), then
    /// the warp to screen center so the crossing cannot immediately
    /// re-trigger once local delivery is disabled.
    async fn switch_to_remote(
        &mut self,
        exit_edge: ScreenEdge,
        position: i32,
    ) -> Result<(), ForwardError> {
        self.control.enter_remote();
        self.forward(Event::SwitchScreen(SwitchScreenEvent {
            edge: exit_edge.opposite(),
            position,
        }))
        .await?;
        self.capture.warp_cursor(self.screen_w / 2, self.screen_h / 2);
        Ok(())
    }

    // ── Keyboard handling ─────────────────────────────────────────────────────

    async fn handle_key(
        &mut self,
        vk_code: u32,
        scan: u32,
        flags: u32,
        pressed: bool,
    ) -> Result<(), ForwardError> {
        self.update_modifiers(vk_code, pressed);

        // ScrollLock toggles which machine is being driven.
        if vk_code == vk::SCROLL_LOCK && pressed {
            if self.control.is_remote() {
                info!("ScrollLock pressed: releasing input capture");
                self.control.release_to_local();
            } else {
                return self.engage_via_scroll_lock().await;
            }
            return Ok(());
        }

        // Ctrl+Alt+Escape is the emergency release chord.
        if vk_code == vk::ESCAPE && self.ctrl_down && self.alt_down && pressed {
            warn!("emergency release: Ctrl+Alt+Escape");
            self.control.release_to_local();
            return Ok(());
        }

        // Emergency keys are observed but never forwarded; the hook backend
        // delivers them to the local OS regardless of the capture flag.
        if self.is_emergency_key(vk_code) {
            return Ok(());
        }

        if self.control.is_remote() {
            let key = KeyEvent { vk: vk_code, scan, flags };
            let event = if pressed {
                Event::KeyPress(key)
            } else {
                Event::KeyRelease(key)
            };
            return self.forward(event).await;
        }
        Ok(())
    }

    /// ScrollLock in LOCAL jumps to the connected neighbor at the midpoint
    /// of the shared edge, if there is one.
    async fn engage_via_scroll_lock(&mut self) -> Result<(), ForwardError> {
        let found = {
            let table = self.peers.lock().expect("peer table lock poisoned");
            [
                (ScreenEdge::Right, self.screen_h / 2),
                (ScreenEdge::Left, self.screen_h / 2),
                (ScreenEdge::Bottom, self.screen_w / 2),
                (ScreenEdge::Top, self.screen_w / 2),
            ]
            .into_iter()
            .find(|(edge, mid)| table.neighbor_at(*edge, *mid).is_some())
        };

        match found {
            Some((edge, mid)) => {
                info!("ScrollLock pressed: switching to {edge:?} neighbor");
                self.switch_to_remote(edge, mid).await
            }
            None => {
                debug!("ScrollLock pressed but no connected neighbor to switch to");
                Ok(())
            }
        }
    }

    fn update_modifiers(&mut self, vk_code: u32, pressed: bool) {
        match vk_code {
            vk::CONTROL | vk::LCONTROL | vk::RCONTROL => self.ctrl_down = pressed,
            vk::MENU | vk::LMENU | vk::RMENU => self.alt_down = pressed,
            vk::SHIFT | vk::LSHIFT | vk::RSHIFT => self.shift_down = pressed,
            _ => {}
        }
    }

    /// The emergency-key allowlist: keys the hook never blocks and the
    /// pipeline never forwards, so the local machine always stays reachable.
    fn is_emergency_key(&self, vk_code: u32) -> bool {
        match vk_code {
            vk::CONTROL | vk::LCONTROL | vk::RCONTROL => true,
            vk::MENU | vk::LMENU | vk::RMENU => true,
            vk::DELETE => true,
            vk::SCROLL_LOCK => true,
            vk::LWIN | vk::RWIN => true,
            vk::ESCAPE if self.ctrl_down => true, // Ctrl+Shift+Esc, Ctrl+Alt+Esc
            vk::TAB if self.alt_down => true,
            vk::F4 if self.alt_down => true,
            _ => false,
        }
    }

    async fn forward(&self, event: Event) -> Result<(), ForwardError> {
        match self.sink.send(&event).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Session-fatal: never leave the hook blocking local input
                // on a dead session.
                warn!("send failed ({e}); returning control to local");
                self.control.release_to_local();
                Err(ForwardError::Transmit(e))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    use mouseshare_core::{AnnouncePacket, MouseButton};

    use crate::infrastructure::capture::mock::MockCapturePort;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<Event>>,
        fail: AtomicBool,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&self, event: &Event) -> Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("injected failure".to_string());
            }
            self.events.lock().unwrap().push(*event);
            Ok(())
        }
    }

    fn peer_addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))
    }

    /// 1920×1080 local screen with a same-size connected peer to the right.
    fn make_pipeline() -> (ForwardInput, Arc<RecordingSink>, Arc<MockCapturePort>) {
        let mut table = PeerTable::new("local", 1920, 1080);
        table.observe_announce(
            &AnnouncePacket::announce("right-peer", 24800, 1920, 1080, false),
            peer_addr(),
            Instant::now(),
        );
        table.connect_peer_at(peer_addr(), ScreenEdge::Right);

        let peers = Arc::new(Mutex::new(table));
        let sink = Arc::new(RecordingSink::default());
        let capture = Arc::new(MockCapturePort::new());
        let pipeline = ForwardInput::new(
            1920,
            1080,
            peers,
            Arc::clone(&sink) as Arc<dyn EventSink>,
            Arc::clone(&capture) as Arc<dyn CapturePort>,
        );
        (pipeline, sink, capture)
    }

    async fn enter_remote(pipeline: &mut ForwardInput) {
        pipeline
            .handle_event(CapturedEvent::MouseMove { x: 1919, y: 540, dx: 1, dy: 0 })
            .await
            .unwrap();
        assert!(pipeline.control().is_remote());
    }

    // ── Edge switching ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_right_edge_crossing_switches_to_remote() {
        let (mut pipeline, sink, capture) = make_pipeline();

        pipeline
            .handle_event(CapturedEvent::MouseMove { x: 1919, y: 540, dx: 1, dy: 0 })
            .await
            .unwrap();

        // SWITCH_SCREEN carries the target's entry edge: opposite of the exit.
        assert_eq!(
            sink.events(),
            vec![Event::SwitchScreen(SwitchScreenEvent {
                edge: ScreenEdge::Left,
                position: 540,
            })]
        );
        assert!(pipeline.control().is_remote());
        assert!(capture.is_captured());
        assert_eq!(capture.last_warp(), Some((960, 540)));
    }

    #[tokio::test]
    async fn test_crossing_suppressed_without_connected_neighbor() {
        let (mut pipeline, sink, capture) = make_pipeline();

        // Left edge has no neighbor at all.
        pipeline
            .handle_event(CapturedEvent::MouseMove { x: 0, y: 540, dx: -1, dy: 0 })
            .await
            .unwrap();

        assert!(sink.events().is_empty());
        assert!(!pipeline.control().is_remote());
        assert!(!capture.is_captured());
    }

    #[tokio::test]
    async fn test_crossing_suppressed_when_neighbor_disconnected() {
        let (mut pipeline, sink, _capture) = make_pipeline();
        pipeline
            .peers
            .lock()
            .unwrap()
            .set_connected("right-peer", false);

        pipeline
            .handle_event(CapturedEvent::MouseMove { x: 1919, y: 540, dx: 1, dy: 0 })
            .await
            .unwrap();

        assert!(sink.events().is_empty());
        assert!(!pipeline.control().is_remote());
    }

    #[tokio::test]
    async fn test_interior_motion_in_local_is_not_forwarded() {
        let (mut pipeline, sink, _capture) = make_pipeline();
        pipeline
            .handle_event(CapturedEvent::MouseMove { x: 960, y: 540, dx: 3, dy: 3 })
            .await
            .unwrap();
        assert!(sink.events().is_empty());
    }

    // ── Remote forwarding ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_remote_events_are_forwarded_in_order() {
        let (mut pipeline, sink, _capture) = make_pipeline();
        enter_remote(&mut pipeline).await;

        pipeline
            .handle_event(CapturedEvent::MouseMove { x: 960, y: 540, dx: 5, dy: -2 })
            .await
            .unwrap();
        pipeline
            .handle_event(CapturedEvent::MouseButton { button: MouseButton::Left, pressed: true })
            .await
            .unwrap();
        pipeline
            .handle_event(CapturedEvent::MouseScroll { dx: 0, dy: -1 })
            .await
            .unwrap();
        pipeline
            .handle_event(CapturedEvent::Key { vk: 0x41, scan: 0x1E, flags: 0, pressed: true })
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 5); // switch + 4 forwarded
        assert!(matches!(events[1], Event::MouseMove(MouseMoveEvent { dx: 5, dy: -2, .. })));
        assert!(matches!(events[2], Event::MouseButton(_)));
        assert!(matches!(events[3], Event::MouseScroll(_)));
        assert!(matches!(events[4], Event::KeyPress(KeyEvent { vk: 0x41, .. })));
    }

    #[tokio::test]
    async fn test_local_buttons_and_keys_are_not_forwarded() {
        let (mut pipeline, sink, _capture) = make_pipeline();

        pipeline
            .handle_event(CapturedEvent::MouseButton { button: MouseButton::Right, pressed: true })
            .await
            .unwrap();
        pipeline
            .handle_event(CapturedEvent::Key { vk: 0x41, scan: 0, flags: 0, pressed: true })
            .await
            .unwrap();

        assert!(sink.events().is_empty());
    }

    // ── ScrollLock and chords ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_scroll_lock_in_remote_releases_within_one_dispatch() {
        let (mut pipeline, sink, capture) = make_pipeline();
        enter_remote(&mut pipeline).await;
        let before = sink.events().len();

        pipeline
            .handle_event(CapturedEvent::Key { vk: vk::SCROLL_LOCK, scan: 0, flags: 0, pressed: true })
            .await
            .unwrap();

        assert!(!pipeline.control().is_remote());
        assert!(!capture.is_captured());
        assert_eq!(sink.events().len(), before, "ScrollLock must not be forwarded");
    }

    #[tokio::test]
    async fn test_scroll_lock_in_local_engages_shared_edge_midpoint() {
        let (mut pipeline, sink, capture) = make_pipeline();

        pipeline
            .handle_event(CapturedEvent::Key { vk: vk::SCROLL_LOCK, scan: 0, flags: 0, pressed: true })
            .await
            .unwrap();

        assert!(pipeline.control().is_remote());
        assert!(capture.is_captured());
        assert_eq!(
            sink.events(),
            vec![Event::SwitchScreen(SwitchScreenEvent {
                edge: ScreenEdge::Left,
                position: 540,
            })]
        );
    }

    #[tokio::test]
    async fn test_scroll_lock_in_local_without_neighbor_is_a_no_op() {
        let (mut pipeline, _sink, capture) = make_pipeline();
        pipeline
            .peers
            .lock()
            .unwrap()
            .set_connected("right-peer", false);

        pipeline
            .handle_event(CapturedEvent::Key { vk: vk::SCROLL_LOCK, scan: 0, flags: 0, pressed: true })
            .await
            .unwrap();

        assert!(!pipeline.control().is_remote());
        assert!(!capture.is_captured());
    }

    #[tokio::test]
    async fn test_ctrl_alt_escape_releases_capture() {
        let (mut pipeline, _sink, capture) = make_pipeline();
        enter_remote(&mut pipeline).await;

        for key in [vk::LCONTROL, vk::LMENU] {
            pipeline
                .handle_event(CapturedEvent::Key { vk: key, scan: 0, flags: 0, pressed: true })
                .await
                .unwrap();
        }
        pipeline
            .handle_event(CapturedEvent::Key { vk: vk::ESCAPE, scan: 0, flags: 0, pressed: true })
            .await
            .unwrap();

        assert!(!pipeline.control().is_remote());
        assert!(!capture.is_captured());
    }

    #[tokio::test]
    async fn test_emergency_keys_in_remote_are_never_forwarded() {
        let (mut pipeline, sink, _capture) = make_pipeline();
        enter_remote(&mut pipeline).await;
        let before = sink.events().len();

        // Ctrl+Alt+Delete, pressed one key at a time.
        for key in [vk::LCONTROL, vk::LMENU, vk::DELETE] {
            pipeline
                .handle_event(CapturedEvent::Key { vk: key, scan: 0, flags: 0, pressed: true })
                .await
                .unwrap();
        }
        // Alt+Tab and Alt+F4 while Alt is still held.
        for key in [vk::TAB, vk::F4] {
            pipeline
                .handle_event(CapturedEvent::Key { vk: key, scan: 0, flags: 0, pressed: true })
                .await
                .unwrap();
        }
        for key in [vk::LWIN, vk::RWIN] {
            pipeline
                .handle_event(CapturedEvent::Key { vk: key, scan: 0, flags: 0, pressed: true })
                .await
                .unwrap();
        }

        assert_eq!(sink.events().len(), before, "no emergency key may reach the wire");
        assert!(pipeline.control().is_remote(), "Ctrl+Alt+Delete alone does not release");
    }

    #[tokio::test]
    async fn test_plain_tab_and_f4_are_forwarded_without_alt() {
        let (mut pipeline, sink, _capture) = make_pipeline();
        enter_remote(&mut pipeline).await;
        let before = sink.events().len();

        for key in [vk::TAB, vk::F4] {
            pipeline
                .handle_event(CapturedEvent::Key { vk: key, scan: 0, flags: 0, pressed: true })
                .await
                .unwrap();
        }

        assert_eq!(sink.events().len(), before + 2);
    }

    // ── Failure and watchdog ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_send_failure_forces_local_before_returning() {
        let (mut pipeline, sink, capture) = make_pipeline();
        enter_remote(&mut pipeline).await;

        sink.set_fail(true);
        let result = pipeline
            .handle_event(CapturedEvent::MouseMove { x: 960, y: 540, dx: 1, dy: 0 })
            .await;

        assert!(matches!(result, Err(ForwardError::Transmit(_))));
        assert!(!pipeline.control().is_remote());
        assert!(!capture.is_captured());
    }

    #[tokio::test]
    async fn test_send_failure_during_switch_releases_capture() {
        let (mut pipeline, sink, capture) = make_pipeline();
        sink.set_fail(true);

        let result = pipeline
            .handle_event(CapturedEvent::MouseMove { x: 1919, y: 540, dx: 1, dy: 0 })
            .await;

        assert!(result.is_err());
        assert!(!pipeline.control().is_remote());
        assert!(!capture.is_captured());
    }

    #[tokio::test]
    async fn test_watchdog_releases_idle_remote() {
        let (mut pipeline, _sink, capture) = make_pipeline();
        enter_remote(&mut pipeline).await;

        let control = pipeline.control();
        assert!(!control.check_watchdog(Duration::from_secs(3600)), "fresh activity");
        assert!(control.check_watchdog(Duration::ZERO), "zero timeout must fire");
        assert!(!control.is_remote());
        assert!(!capture.is_captured());
    }

    #[tokio::test]
    async fn test_watchdog_is_inert_while_local() {
        let (pipeline, _sink, _capture) = make_pipeline();
        assert!(!pipeline.control().check_watchdog(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_release_to_local_is_idempotent() {
        let (mut pipeline, _sink, capture) = make_pipeline();
        enter_remote(&mut pipeline).await;

        let control = pipeline.control();
        control.release_to_local();
        control.release_to_local();
        assert!(!control.is_remote());
        assert!(!capture.is_captured());
    }
}
