use std::sync::Arc;

use chrono::SecondsFormat;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use courier_db::Database;
use courier_gateway::Dispatcher;
use courier_types::api::PartnerEntry;
use courier_types::events::GatewayEvent;
use courier_types::models::Message;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Submission carried neither text nor an image reference. Rejected
    /// before anything is persisted.
    #[error("message must carry text or an image reference")]
    EmptyMessage,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// The message store and relay: persists every submission, then makes a
/// best-effort push to the receiver's live connection. Durability comes from
/// the store; the push is an optimization the receiver reconciles against at
/// fetch time.
#[derive(Clone)]
pub struct MessageRelay {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl MessageRelay {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Persist a message (seen = false) and push it to the receiver if they
    /// hold a live connection. A failed push is logged and swallowed: the
    /// message is already durable and a later fetch delivers it.
    pub async fn submit(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: Option<String>,
        image_ref: Option<String>,
    ) -> Result<Message, RelayError> {
        let has_text = text.as_deref().is_some_and(|t| !t.is_empty());
        let has_image = image_ref.as_deref().is_some_and(|r| !r.is_empty());
        if !has_text && !has_image {
            return Err(RelayError::EmptyMessage);
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            text: text.filter(|t| !t.is_empty()),
            image_ref: image_ref.filter(|r| !r.is_empty()),
            seen: false,
            created_at: chrono::Utc::now(),
        };

        // Run blocking DB insert off the async runtime
        let db = self.db.clone();
        let record = message.clone();
        tokio::task::spawn_blocking(move || {
            db.insert_message(
                &record.id.to_string(),
                &record.sender_id.to_string(),
                &record.receiver_id.to_string(),
                record.text.as_deref(),
                record.image_ref.as_deref(),
                // Fixed-width timestamps so lexicographic ORDER BY matches
                // chronological order
                &record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            )
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        let delivered = self
            .dispatcher
            .push_to_user(receiver_id, GatewayEvent::NewMessage { message: message.clone() })
            .await;
        if !delivered {
            debug!("Receiver {} offline, message {} awaits fetch", receiver_id, message.id);
        }

        Ok(message)
    }

    /// All messages between the pair, oldest first. Marks everything
    /// `peer_id` sent to `user_id` as seen.
    pub async fn fetch_conversation(
        &self,
        user_id: Uuid,
        peer_id: Uuid,
    ) -> Result<Vec<Message>, RelayError> {
        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || {
            db.get_conversation(&user_id.to_string(), &peer_id.to_string())
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        Ok(rows.into_iter().map(|row| row.into_message()).collect())
    }

    /// Mark one message seen. Idempotent; an unknown id is a no-op.
    pub async fn mark_seen(&self, message_id: Uuid) -> Result<(), RelayError> {
        let db = self.db.clone();
        let changed = tokio::task::spawn_blocking(move || db.mark_seen(&message_id.to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        if !changed {
            debug!("mark_seen({}) changed nothing", message_id);
        }
        Ok(())
    }

    /// Number of not-yet-seen messages from `sender_id` to `receiver_id`.
    pub async fn count_unseen(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64, RelayError> {
        let db = self.db.clone();
        let count = tokio::task::spawn_blocking(move || {
            db.count_unseen(&sender_id.to_string(), &receiver_id.to_string())
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        Ok(count)
    }

    /// Conversation partners of `user_id` with their unseen counts and an
    /// online annotation from the current presence set. Seeds the client's
    /// per-peer counters at session start.
    pub async fn partners(&self, user_id: Uuid) -> Result<Vec<PartnerEntry>, RelayError> {
        let db = self.db.clone();
        let counted = tokio::task::spawn_blocking(move || {
            let me = user_id.to_string();
            let ids = db.partner_ids(&me)?;
            ids.into_iter()
                .map(|peer| {
                    let unseen = db.count_unseen(&peer, &me)?;
                    Ok((peer, unseen))
                })
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        let online = self.dispatcher.online_users().await;

        let entries = counted
            .into_iter()
            .filter_map(|(peer, unseen)| {
                let peer_id: Uuid = match peer.parse() {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!("Corrupt partner id '{}': {}", peer, e);
                        return None;
                    }
                };
                Some(PartnerEntry {
                    user_id: peer_id,
                    unseen,
                    online: online.contains(&peer_id),
                })
            })
            .collect();

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> MessageRelay {
        let db = Arc::new(Database::open_in_memory().unwrap());
        MessageRelay::new(db, Dispatcher::new())
    }

    #[tokio::test]
    async fn submit_rejects_empty_messages() {
        let relay = relay();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let err = relay.submit(alice, bob, None, None).await.unwrap_err();
        assert!(matches!(err, RelayError::EmptyMessage));

        let err = relay
            .submit(alice, bob, Some(String::new()), Some(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::EmptyMessage));

        // Nothing was persisted
        let history = relay.fetch_conversation(bob, alice).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn submit_pushes_to_online_receiver() {
        let relay = relay();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (_conn, mut rx) = relay.dispatcher().register(bob).await;

        let sent = relay
            .submit(alice, bob, Some("hi".into()), None)
            .await
            .unwrap();
        assert!(!sent.seen);

        match rx.recv().await {
            Some(GatewayEvent::NewMessage { message }) => {
                assert_eq!(message.id, sent.id);
                assert_eq!(message.text.as_deref(), Some("hi"));
            }
            other => panic!("expected NewMessage push, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn offline_receiver_recovers_via_fetch() {
        let relay = relay();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        // Bob is offline: persisted, no push observable anywhere
        let sent = relay
            .submit(alice, bob, Some("hi".into()), None)
            .await
            .unwrap();
        assert_eq!(relay.count_unseen(alice, bob).await.unwrap(), 1);

        // Bob connects later and fetches the conversation
        let history = relay.fetch_conversation(bob, alice).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, sent.id);

        // The fetch marked it seen
        assert_eq!(relay.count_unseen(alice, bob).await.unwrap(), 0);
        let history = relay.fetch_conversation(alice, bob).await.unwrap();
        assert!(history[0].seen);
    }

    #[tokio::test]
    async fn push_failure_does_not_fail_submission() {
        let relay = relay();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        // Register bob, then drop the receive half to simulate a transport
        // that closed between lookup and push
        let (_conn, rx) = relay.dispatcher().register(bob).await;
        drop(rx);

        let sent = relay
            .submit(alice, bob, Some("hi".into()), None)
            .await
            .unwrap();

        // Durable despite the dead transport
        let history = relay.fetch_conversation(bob, alice).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, sent.id);
    }

    #[tokio::test]
    async fn mark_seen_is_idempotent() {
        let relay = relay();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let sent = relay
            .submit(alice, bob, Some("hi".into()), None)
            .await
            .unwrap();

        relay.mark_seen(sent.id).await.unwrap();
        relay.mark_seen(sent.id).await.unwrap();
        relay.mark_seen(Uuid::new_v4()).await.unwrap(); // unknown id: no-op

        assert_eq!(relay.count_unseen(alice, bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partners_carry_unseen_counts_and_online_flags() {
        let relay = relay();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        relay
            .submit(alice, bob, Some("one".into()), None)
            .await
            .unwrap();
        relay
            .submit(alice, bob, Some("two".into()), None)
            .await
            .unwrap();
        relay
            .submit(carol, bob, None, Some("obj://vacation.jpg".into()))
            .await
            .unwrap();

        let (_conn, _rx) = relay.dispatcher().register(carol).await;

        let mut partners = relay.partners(bob).await.unwrap();
        partners.sort_by_key(|p| p.user_id);
        let mut expected = vec![(alice, 2, false), (carol, 1, true)];
        expected.sort_by_key(|e| e.0);

        assert_eq!(partners.len(), 2);
        for (entry, (id, unseen, online)) in partners.iter().zip(expected) {
            assert_eq!(entry.user_id, id);
            assert_eq!(entry.unseen, unseen);
            assert_eq!(entry.online, online);
        }
    }

    #[tokio::test]
    async fn image_only_messages_are_valid() {
        let relay = relay();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let sent = relay
            .submit(alice, bob, None, Some("obj://cat.png".into()))
            .await
            .unwrap();

        let history = relay.fetch_conversation(bob, alice).await.unwrap();
        assert_eq!(history[0].image_ref.as_deref(), Some("obj://cat.png"));
        assert_eq!(history[0].text, None);
        assert_eq!(history[0].id, sent.id);
    }
}
