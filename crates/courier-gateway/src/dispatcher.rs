use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use courier_types::events::GatewayEvent;

/// One live connection for a user: the send half of its event channel plus
/// the connection id used to guard against unregistering a superseded record.
struct Registration {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

/// Connection registry and presence broadcaster.
///
/// Tracks at most one live transport per user (a later connect silently
/// supersedes an earlier one) and publishes a full online-id snapshot to
/// every subscriber on each registry change. Cheap to clone; all clones
/// share one registry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for events every connection receives (presence
    /// snapshots). Delivery is best effort: no acknowledgment, no retry.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// user_id -> live connection. The single mutual-exclusion domain for
    /// all register/unregister/lookup traffic.
    connections: RwLock<HashMap<Uuid, Registration>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to broadcast events. Connection loops call this before
    /// registering so they never miss their own registration's snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Record a live connection for `user_id`, replacing any existing one.
    /// Returns the connection id and the receive half of the user's event
    /// channel. Announces the new online set to all subscribers.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut connections = self.inner.connections.write().await;
        connections.insert(user_id, Registration { conn_id, tx });
        self.announce(&connections);

        (conn_id, rx)
    }

    /// Remove the connection for `user_id`, but only if `conn_id` still owns
    /// it. A stale unregister (the record was already superseded by a newer
    /// connect) is silently ignored.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut connections = self.inner.connections.write().await;
        let is_current = connections
            .get(&user_id)
            .is_some_and(|reg| reg.conn_id == conn_id);

        if is_current {
            connections.remove(&user_id);
            self.announce(&connections);
        } else {
            debug!("Stale unregister for {} ignored", user_id);
        }
    }

    /// Push an event to a user's live connection, if any. Returns whether
    /// the event was handed to a transport. A false return is not an error:
    /// the receiver is offline or disconnected mid-push, and durable state
    /// is reconciled at fetch time.
    pub async fn push_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let connections = self.inner.connections.read().await;
        match connections.get(&user_id) {
            Some(reg) => reg.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Current online set. Used for the partner-list online annotation.
    pub async fn online_users(&self) -> Vec<Uuid> {
        self.inner.connections.read().await.keys().copied().collect()
    }

    /// Publish the full online-id snapshot. Called with the write lock held
    /// so snapshots reach the channel in mutation order.
    fn announce(&self, connections: &HashMap<Uuid, Registration>) {
        let online: Vec<Uuid> = connections.keys().copied().collect();
        let _ = self
            .inner
            .broadcast_tx
            .send(GatewayEvent::PresenceSnapshot { online });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
