use crate::Database;
use crate::models::MessageRow;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    /// Persist one message with seen = false. The caller assigns the id and
    /// timestamp so the value it returns matches what a later fetch reads.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        text: Option<&str>,
        image_ref: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image_ref, seen, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![id, sender_id, receiver_id, text, image_ref, created_at],
            )?;
            Ok(())
        })
    }

    /// All messages between the pair, oldest first. Side effect: everything
    /// `user_b` sent to `user_a` is marked seen, under the same lock as the
    /// select. Returned rows carry their pre-update seen values.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let rows = query_conversation(conn, user_a, user_b)?;

            conn.execute(
                "UPDATE messages SET seen = 1
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
                [user_b, user_a],
            )?;

            Ok(rows)
        })
    }

    /// Mark a single message seen. Returns whether a row changed; an unknown
    /// id or an already-seen message is a no-op.
    pub fn mark_seen(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET seen = 1 WHERE id = ?1 AND seen = 0",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Number of not-yet-seen messages from `sender_id` to `receiver_id`.
    pub fn count_unseen(&self, sender_id: &str, receiver_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
                [sender_id, receiver_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Distinct users this user has exchanged at least one message with.
    pub fn partner_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT CASE WHEN sender_id = ?1 THEN receiver_id ELSE sender_id END
                 FROM messages
                 WHERE sender_id = ?1 OR receiver_id = ?1",
            )?;

            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(ids)
        })
    }
}

fn query_conversation(conn: &Connection, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender_id, receiver_id, text, image_ref, seen, created_at
         FROM messages
         WHERE (sender_id = ?1 AND receiver_id = ?2)
            OR (sender_id = ?2 AND receiver_id = ?1)
         ORDER BY created_at ASC",
    )?;

    let rows = stmt
        .query_map([user_a, user_b], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                text: row.get(3)?,
                image_ref: row.get(4)?,
                seen: row.get::<_, i64>(5)? != 0,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn store() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn insert(db: &Database, sender: &str, receiver: &str, text: &str, at: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_message(&id, sender, receiver, Some(text), None, at)
            .unwrap();
        id
    }

    #[test]
    fn conversation_is_ordered_and_bidirectional() {
        let db = store();
        insert(&db, "alice", "bob", "first", "2026-01-01T10:00:00.000000Z");
        insert(&db, "bob", "alice", "second", "2026-01-01T10:00:01.000000Z");
        insert(&db, "alice", "bob", "third", "2026-01-01T10:00:02.000000Z");
        // Unrelated pair must not leak in
        insert(&db, "carol", "bob", "other", "2026-01-01T10:00:03.000000Z");

        let rows = db.get_conversation("alice", "bob").unwrap();
        let texts: Vec<_> = rows.iter().map(|r| r.text.as_deref().unwrap()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn fetch_marks_peer_messages_seen() {
        let db = store();
        insert(&db, "bob", "alice", "hi", "2026-01-01T10:00:00.000000Z");
        insert(&db, "alice", "bob", "hello", "2026-01-01T10:00:01.000000Z");

        // First fetch by alice returns bob's message with its pre-update value
        let rows = db.get_conversation("alice", "bob").unwrap();
        assert!(rows.iter().all(|r| !r.seen));

        // The update landed: bob->alice is now seen, alice->bob is not
        let rows = db.get_conversation("alice", "bob").unwrap();
        let bob_msg = rows.iter().find(|r| r.sender_id == "bob").unwrap();
        let alice_msg = rows.iter().find(|r| r.sender_id == "alice").unwrap();
        assert!(bob_msg.seen);
        assert!(!alice_msg.seen);
    }

    #[test]
    fn mark_seen_is_idempotent_and_tolerates_unknown_ids() {
        let db = store();
        let id = insert(&db, "bob", "alice", "hi", "2026-01-01T10:00:00.000000Z");

        assert!(db.mark_seen(&id).unwrap());
        assert!(!db.mark_seen(&id).unwrap()); // second call is a no-op
        assert!(!db.mark_seen("no-such-id").unwrap());

        assert_eq!(db.count_unseen("bob", "alice").unwrap(), 0);
    }

    #[test]
    fn count_unseen_tracks_fetches() {
        let db = store();
        insert(&db, "bob", "alice", "one", "2026-01-01T10:00:00.000000Z");
        insert(&db, "bob", "alice", "two", "2026-01-01T10:00:01.000000Z");
        insert(&db, "alice", "bob", "reply", "2026-01-01T10:00:02.000000Z");

        assert_eq!(db.count_unseen("bob", "alice").unwrap(), 2);
        assert_eq!(db.count_unseen("alice", "bob").unwrap(), 1);

        db.get_conversation("alice", "bob").unwrap();
        assert_eq!(db.count_unseen("bob", "alice").unwrap(), 0);
        assert_eq!(db.count_unseen("alice", "bob").unwrap(), 1);
    }

    #[test]
    fn partner_ids_are_distinct_across_directions() {
        let db = store();
        insert(&db, "alice", "bob", "a", "2026-01-01T10:00:00.000000Z");
        insert(&db, "bob", "alice", "b", "2026-01-01T10:00:01.000000Z");
        insert(&db, "carol", "alice", "c", "2026-01-01T10:00:02.000000Z");

        let mut partners = db.partner_ids("alice").unwrap();
        partners.sort();
        assert_eq!(partners, vec!["bob", "carol"]);
    }
}
