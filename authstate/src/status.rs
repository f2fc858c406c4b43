//! Status fan-out to observers.

use std::sync::Arc;

use authstate_core::AuthStatus;
use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 32;

/// Publishes [`AuthStatus`] transitions to any number of subscribers and
/// remembers the latest one. Clones share the same channel.
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    sender: broadcast::Sender<AuthStatus>,
    current: Arc<RwLock<AuthStatus>>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    /// Create a broadcaster with the default buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a broadcaster buffering `capacity` statuses per slow subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            current: Arc::new(RwLock::new(AuthStatus::Unauthenticated)),
        }
    }

    /// Publish a transition.
    pub fn publish(&self, status: AuthStatus) {
        // Held while sending so `current` and the channel agree on order.
        let mut current = self.current.write();
        debug!(status = status_name(&status), "Auth status changed");
        *current = status.clone();
        // No receivers is fine.
        let _ = self.sender.send(status);
    }

    /// The latest published status.
    pub fn current(&self) -> AuthStatus {
        self.current.read().clone()
    }

    /// A raw receiver for every future transition.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthStatus> {
        self.sender.subscribe()
    }

    /// Every future transition as a stream. Lagged items are skipped.
    pub fn stream(&self) -> impl Stream<Item = AuthStatus> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| item.ok())
    }
}

fn status_name(status: &AuthStatus) -> &'static str {
    match status {
        AuthStatus::Unauthenticated => "unauthenticated",
        AuthStatus::Authenticating => "authenticating",
        AuthStatus::Refreshing => "refreshing",
        AuthStatus::Authorized { .. } => "authorized",
        AuthStatus::Error { .. } => "error",
    }
}
