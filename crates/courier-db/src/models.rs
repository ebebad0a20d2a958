//! Database row types — these map directly to SQLite rows.
//! Distinct from the courier-types API models to keep the DB layer
//! independent of serialization concerns.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use courier_types::models::Message;

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_ref: Option<String>,
    pub seen: bool,
    pub created_at: String,
}

impl MessageRow {
    /// Convert a raw row into the shared `Message` model. Corrupt columns
    /// are logged and replaced with defaults rather than failing the whole
    /// fetch.
    pub fn into_message(self) -> Message {
        Message {
            id: parse_uuid(&self.id, "id", &self.id),
            sender_id: parse_uuid(&self.sender_id, "sender_id", &self.id),
            receiver_id: parse_uuid(&self.receiver_id, "receiver_id", &self.id),
            text: self.text,
            image_ref: self.image_ref,
            seen: self.seen,
            created_at: parse_timestamp(&self.created_at, &self.id),
        }
    }
}

fn parse_uuid(value: &str, column: &str, message_id: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on message '{}': {}", column, value, message_id, e);
        Uuid::default()
    })
}

fn parse_timestamp(value: &str, message_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') default stores "YYYY-MM-DD HH:MM:SS"
            // without a timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message '{}': {}", value, message_id, e);
            DateTime::default()
        })
}
