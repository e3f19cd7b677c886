//! Active/stopped switch observed by the streaming task.
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Active,
    Stopped,
}

/// Shared switch that tells the streaming loop whether it should keep running.
///
/// Subscribers are notified of every state change, which lets a sleeping retry loop wake up as
/// soon as the connection is stopped.
#[derive(Debug)]
pub struct ConnectionStateController {
    sender: watch::Sender<ConnectionState>,
}

impl ConnectionStateController {
    /// Create a controller in the stopped state.
    pub fn new() -> ConnectionStateController {
        let (sender, _receiver) = watch::channel(ConnectionState::Stopped);
        ConnectionStateController { sender }
    }

    /// Switch to active. Returns `false` if already active.
    pub fn start(&self) -> bool {
        self.set(ConnectionState::Active)
    }

    /// Switch to stopped. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        self.set(ConnectionState::Stopped)
    }

    fn set(&self, state: ConnectionState) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            log::debug!(target: "growthbook", state:debug; "connection state changed");
        }
        changed
    }

    pub fn state(&self) -> ConnectionState {
        *self.sender.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.sender.subscribe()
    }
}

impl Default for ConnectionStateController {
    fn default() -> Self {
        ConnectionStateController::new()
    }
}

/// Wait until `receiver` observes [`ConnectionState::Stopped`].
///
/// Returns immediately if already stopped. If the controller is dropped, counts as stopped.
pub(crate) async fn stopped(receiver: &mut watch::Receiver<ConnectionState>) {
    // `wait_for` only fails when the sender is gone.
    let _ = receiver
        .wait_for(|state| *state == ConnectionState::Stopped)
        .await;
}
