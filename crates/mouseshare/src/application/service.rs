//! Top-level service lifecycle.
//!
//! A process is Idle until it takes exactly one role: Serving (controller)
//! or Joined (target). The roles are mutually exclusive; taking one while
//! another is active fails. Teardown runs through Draining: sockets are
//! closed first so blocked tasks unblock, the session loops and threads then
//! finish, and peer connected-flags are reset last (the role guard does this
//! on drop).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;

use mouseshare_core::PeerTable;

/// The service's lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    Idle,
    Serving,
    Joined,
    Draining,
}

/// Error type for lifecycle transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("cannot take role while {0:?}")]
    RoleBusy(RoleState),
}

/// Shared lifecycle state owned by `main` and observed by every loop.
pub struct Service {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    state: Arc<Mutex<RoleState>>,
    peers: Arc<Mutex<PeerTable>>,
}

impl Service {
    pub fn new(peers: Arc<Mutex<PeerTable>>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
            state: Arc::new(Mutex::new(RoleState::Idle)),
            peers,
        }
    }

    /// The global running flag; loops observe it on every iteration.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Notified when shutdown begins, so blocked accepts/reads unblock.
    pub fn shutdown_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn state(&self) -> RoleState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Enters the controller role.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::RoleBusy`] unless the service is idle.
    pub fn begin_serving(&self) -> Result<RoleGuard, ServiceError> {
        self.take_role(RoleState::Serving)
    }

    /// Enters the target role.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::RoleBusy`] unless the service is idle.
    pub fn begin_joining(&self) -> Result<RoleGuard, ServiceError> {
        self.take_role(RoleState::Joined)
    }

    fn take_role(&self, role: RoleState) -> Result<RoleGuard, ServiceError> {
        let mut state = self.state.lock().expect("state lock poisoned");
        if *state != RoleState::Idle {
            return Err(ServiceError::RoleBusy(*state));
        }
        *state = role;
        info!("service state: {role:?}");
        Ok(RoleGuard {
            state: Arc::clone(&self.state),
            peers: Arc::clone(&self.peers),
        })
    }

    /// Begins shutdown: clears the running flag and wakes every waiter.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("shutdown requested");
        }
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Held for the duration of a role. Dropping it drains the service: peer
/// connected-flags are reset and the state returns to Idle.
#[derive(Debug)]
pub struct RoleGuard {
    state: Arc<Mutex<RoleState>>,
    peers: Arc<Mutex<PeerTable>>,
}

impl Drop for RoleGuard {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            *state = RoleState::Draining;
        }
        self.peers
            .lock()
            .expect("peer table lock poisoned")
            .reset_connected();
        let mut state = self.state.lock().expect("state lock poisoned");
        *state = RoleState::Idle;
        info!("service state: Idle");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
