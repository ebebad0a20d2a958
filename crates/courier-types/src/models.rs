use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A direct message between two users.
///
/// At least one of `text` / `image_ref` is always present — the relay rejects
/// submissions with neither. `image_ref` is an opaque reference to an object
/// stored elsewhere; this system never sees the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub image_ref: Option<String>,
    /// Receiver acknowledgment. Transitions false -> true exactly once,
    /// either by an explicit mark or by the receiver fetching the
    /// conversation containing it.
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}
