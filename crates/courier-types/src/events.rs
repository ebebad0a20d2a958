use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events pushed server -> client over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Full list of currently-online user ids. Sent to every live connection
    /// whenever the connection registry changes; replaces any prior snapshot
    /// on the client. Always a full set, never a delta — a missed broadcast
    /// is corrected by the next one.
    PresenceSnapshot { online: Vec<Uuid> },

    /// A message addressed to this connection's user was just persisted.
    /// Delivery is best effort; the message is already durable and will be
    /// returned by a conversation fetch regardless.
    NewMessage { message: Message },
}
