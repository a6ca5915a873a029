//! Connection lifecycle types.
//!
//! The transport owns the only writer of the connection state; everything here
//! is a read-side view for callers and UI bindings.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Connection state of the real-time client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No physical connection (initial, after a drop, between retries)
    #[default]
    Disconnected,
    /// One physical connection attempt is in flight
    Connecting,
    /// The socket is open; sends and subscriptions go out immediately
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Handle returned by a successful `connect()`.
///
/// It names one connection epoch. Once that socket closes the handle stays
/// valid to hold but `is_current()` turns false; a reconnect yields a new epoch.
#[derive(Clone)]
pub struct ConnectionHandle {
    epoch: u64,
    live_epoch: Arc<AtomicU64>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        epoch: u64,
        live_epoch: Arc<AtomicU64>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            epoch,
            live_epoch,
            state,
        }
    }

    /// Epoch number this handle was issued for (starts at 1).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// True while the connection this handle names is still open.
    pub fn is_current(&self) -> bool {
        self.state() == ConnectionState::Connected
            && self.live_epoch.load(Ordering::SeqCst) == self.epoch
    }

    /// Observer sharing this handle's state channel.
    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(self.state.clone())
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("epoch", &self.epoch)
            .field("state", &self.state())
            .finish()
    }
}

/// Observable connection state for UI binding.
///
/// Multiple observers can share the same underlying channel.
#[derive(Clone)]
pub struct ConnectionStateObserver {
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionStateObserver {
    pub fn new(state: watch::Receiver<ConnectionState>) -> Self {
        Self { state }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Wait for the next state change and return the new state.
    ///
    /// Returns `None` once the client has been dropped.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    /// Wait until the state equals `target`.
    pub async fn wait_for(&mut self, target: ConnectionState) -> Option<ConnectionState> {
        self.state
            .wait_for(|state| *state == target)
            .await
            .ok()
            .map(|state| *state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_tracks_live_epoch() {
        let (tx, rx) = watch::channel(ConnectionState::Connected);
        let live = Arc::new(AtomicU64::new(1));
        let handle = ConnectionHandle::new(1, Arc::clone(&live), rx);

        assert!(handle.is_current());

        live.store(2, Ordering::SeqCst);
        assert!(!handle.is_current());

        live.store(1, Ordering::SeqCst);
        tx.send_replace(ConnectionState::Disconnected);
        assert!(!handle.is_current());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_observer_sees_changes() {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        let mut observer = ConnectionStateObserver::new(rx);
        assert!(!observer.is_connected());

        tx.send_replace(ConnectionState::Connecting);
        assert_eq!(observer.changed().await, Some(ConnectionState::Connecting));

        tx.send_replace(ConnectionState::Connected);
        assert_eq!(
            observer.wait_for(ConnectionState::Connected).await,
            Some(ConnectionState::Connected)
        );
        assert!(observer.is_connected());
    }
}
