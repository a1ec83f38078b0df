use crate::models::{ChatRow, MessageRow, ThreadRow};
use crate::{now_ts, Database};
use anyhow::{anyhow, Result};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

/// Canonical key for an unordered participant pair. Both orderings of the
/// same two identities map to the same key, which carries the UNIQUE
/// constraint in the chats table.
pub fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

impl Database {
    /// Find or create the single chat between two participants.
    ///
    /// Creation inserts the chat and both participant links in one
    /// transaction. A writer that loses the race gets a no-op from the
    /// conflicting insert and falls back to the lookup, so every caller
    /// ends up with the same chat id.
    pub fn resolve_thread(&self, a: &str, b: &str) -> Result<String> {
        let key = pair_key(a, b);
        let id = Uuid::new_v4().to_string();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            if let Some(existing) = chat_id_by_pair_key(conn, &key)? {
                return Ok(existing);
            }

            let tx = conn.transaction()?;
            let created = tx.execute(
                "INSERT INTO chats (id, pair_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(pair_key) DO NOTHING",
                (&id, &key, &now),
            )?;
            if created == 1 {
                tx.execute(
                    "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                    (&id, a),
                )?;
                tx.execute(
                    "INSERT OR IGNORE INTO chat_participants (chat_id, user_id) VALUES (?1, ?2)",
                    (&id, b),
                )?;
            }
            tx.commit()?;

            if created == 1 {
                Ok(id.clone())
            } else {
                // Lost the race; the winner's row is committed by now.
                chat_id_by_pair_key(conn, &key)?
                    .ok_or_else(|| anyhow!("chat vanished after pair_key conflict: {}", key))
            }
        })
    }

    /// Insert a message and bump the chat's updated_at with the same clock
    /// value, atomically.
    pub fn append_message(
        &self,
        chat_id: &str,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
    ) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = now_ts();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, receiver_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (&id, chat_id, sender_id, receiver_id, body, &now),
            )?;
            tx.execute(
                "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
                (&now, chat_id),
            )?;
            tx.commit()?;

            Ok(MessageRow {
                id: id.clone(),
                chat_id: chat_id.to_string(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                body: body.to_string(),
                created_at: now.clone(),
            })
        })
    }

    /// Messages in non-decreasing timestamp order, ties broken by insertion
    /// order.
    pub fn get_chat_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, receiver_id, body, created_at
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([chat_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_chat_participant(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM chat_participants WHERE chat_id = ?1 AND user_id = ?2",
                    (chat_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// A user's chats, most recently active first, each with its full
    /// participant set and newest message.
    pub fn list_threads_for(&self, user_id: &str) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.pair_key, c.created_at, c.updated_at
                 FROM chats c
                 JOIN chat_participants p ON p.chat_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.updated_at DESC",
            )?;
            let chats = stmt
                .query_map([user_id], |row| {
                    Ok(ChatRow {
                        id: row.get(0)?,
                        pair_key: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut threads = Vec::with_capacity(chats.len());
            for chat in chats {
                let participants = chat_participants(conn, &chat.id)?;
                let last_message = last_message(conn, &chat.id)?;
                threads.push(ThreadRow {
                    chat,
                    participants,
                    last_message,
                });
            }
            Ok(threads)
        })
    }
}

fn chat_id_by_pair_key(conn: &Connection, key: &str) -> Result<Option<String>> {
    let id = conn
        .query_row("SELECT id FROM chats WHERE pair_key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

fn chat_participants(conn: &Connection, chat_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM chat_participants WHERE chat_id = ?1 ORDER BY user_id")?;
    let ids = stmt
        .query_map([chat_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn last_message(conn: &Connection, chat_id: &str) -> Result<Option<MessageRow>> {
    let row = conn
        .query_row(
            "SELECT id, chat_id, sender_id, receiver_id, body, created_at
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            [chat_id],
            message_from_row,
        )
        .optional()?;
    Ok(row)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRow;
    use std::sync::Arc;

    fn seed_user(db: &Database, id: &str, email: &str) {
        let now = now_ts();
        db.create_user(&UserRow {
            id: id.to_string(),
            username: "tester".to_string(),
            email: email.to_string(),
            password_hash: "!".to_string(),
            agreed_to_terms: true,
            email_verified: false,
            is_subscribed: false,
            subscription_ref: None,
            customer_ref: None,
            trial_ends_at: now.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
        .unwrap();
    }

    fn chat_count(db: &Database) -> usize {
        db.with_conn(|conn| {
            let n: usize = conn.query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?;
            Ok(n)
        })
        .unwrap()
    }

    #[test]
    fn pair_key_ignores_argument_order() {
        assert_eq!(pair_key("a", "b"), pair_key("b", "a"));
        assert_eq!(pair_key("a", "b"), "a:b");
    }

    #[test]
    fn resolve_is_idempotent_and_symmetric() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        let first = db.resolve_thread("u1", "u2").unwrap();
        let second = db.resolve_thread("u1", "u2").unwrap();
        let swapped = db.resolve_thread("u2", "u1").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, swapped);
        assert_eq!(chat_count(&db), 1);
    }

    #[test]
    fn resolve_creates_exactly_two_participant_links() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        let chat_id = db.resolve_thread("u1", "u2").unwrap();
        let participants = db
            .with_conn(|conn| chat_participants(conn, &chat_id))
            .unwrap();
        assert_eq!(participants, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn resolve_recovers_when_pair_row_already_exists() {
        // Simulates losing the creation race to another process: the chat
        // row is already committed under our pair key.
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        let key = pair_key("u1", "u2");
        db.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chats (id, pair_key, created_at, updated_at)
                 VALUES ('winner', ?1, ?2, ?2)",
                (&key, &now_ts()),
            )?;
            Ok(())
        })
        .unwrap();

        assert_eq!(db.resolve_thread("u1", "u2").unwrap(), "winner");
        assert_eq!(chat_count(&db), 1);
    }

    #[test]
    fn concurrent_resolves_converge_on_one_chat() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.resolve_thread("u1", "u2").unwrap())
            })
            .collect();

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(chat_count(&db), 1);
    }

    #[test]
    fn messages_come_back_in_append_order() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        let chat_id = db.resolve_thread("u1", "u2").unwrap();
        for i in 0..5 {
            db.append_message(&chat_id, "u1", "u2", &format!("msg {i}"))
                .unwrap();
        }

        let messages = db.get_chat_messages(&chat_id).unwrap();
        assert_eq!(messages.len(), 5);
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
        assert!(messages
            .windows(2)
            .all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn append_bumps_updated_at_to_message_timestamp() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        let chat_id = db.resolve_thread("u1", "u2").unwrap();
        let message = db.append_message(&chat_id, "u1", "u2", "hey").unwrap();

        let updated_at: String = db
            .with_conn(|conn| {
                let v = conn.query_row(
                    "SELECT updated_at FROM chats WHERE id = ?1",
                    [&chat_id],
                    |row| row.get(0),
                )?;
                Ok(v)
            })
            .unwrap();
        assert_eq!(updated_at, message.created_at);
    }

    #[test]
    fn thread_listing_orders_by_recency_and_carries_last_message() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");
        seed_user(&db, "u3", "c@x.com");

        let chat_a = db.resolve_thread("u1", "u2").unwrap();
        let chat_b = db.resolve_thread("u1", "u3").unwrap();

        db.append_message(&chat_a, "u1", "u2", "older").unwrap();
        db.append_message(&chat_b, "u1", "u3", "newer").unwrap();

        let threads = db.list_threads_for("u1").unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].chat.id, chat_b);
        assert_eq!(threads[1].chat.id, chat_a);
        assert_eq!(threads[0].last_message.as_ref().unwrap().body, "newer");
        assert_eq!(threads[0].participants.len(), 2);

        // u2 only sees the chat they participate in
        assert_eq!(db.list_threads_for("u2").unwrap().len(), 1);
    }

    #[test]
    fn empty_thread_lists_with_no_last_message() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "u1", "a@x.com");
        seed_user(&db, "u2", "b@x.com");

        db.resolve_thread("u1", "u2").unwrap();
        let threads = db.list_threads_for("u1").unwrap();
        assert_eq!(threads.len(), 1);
        assert!(threads[0].last_message.is_none());
    }
}
