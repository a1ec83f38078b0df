use crate::models::{ResetCodeRow, SessionRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, agreed_to_terms,
                                    email_verified, is_subscribed, subscription_ref,
                                    customer_ref, trial_ends_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    user.id,
                    user.username,
                    user.email,
                    user.password_hash,
                    user.agreed_to_terms,
                    user.email_verified,
                    user.is_subscribed,
                    user.subscription_ref,
                    user.customer_ref,
                    user.trial_ends_at,
                    user.created_at,
                    user.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn update_password(&self, email: &str, password_hash: &str, now: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE email = ?3",
                (password_hash, now, email),
            )?;
            Ok(n == 1)
        })
    }

    pub fn mark_subscribed(
        &self,
        user_id: &str,
        subscription_ref: Option<&str>,
        customer_ref: Option<&str>,
        now: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users
                 SET is_subscribed = 1, subscription_ref = ?1, customer_ref = ?2, updated_at = ?3
                 WHERE id = ?4",
                (subscription_ref, customer_ref, now, user_id),
            )?;
            Ok(n == 1)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, session: &SessionRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, refresh_token, user_agent, ip_address,
                                       created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    session.id,
                    session.user_id,
                    session.refresh_token,
                    session.user_agent,
                    session.ip_address,
                    session.created_at,
                    session.expires_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Session matching the refresh token that has not passed `now`.
    pub fn get_active_session(&self, refresh_token: &str, now: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, refresh_token, user_agent, ip_address, created_at, expires_at
                     FROM sessions
                     WHERE refresh_token = ?1 AND expires_at > ?2",
                    (refresh_token, now),
                    session_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_session_by_token(&self, refresh_token: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM sessions WHERE refresh_token = ?1", [refresh_token])?;
            Ok(n > 0)
        })
    }

    /// Lazy reap of a user's expired sessions, run before inserting a new one.
    pub fn delete_expired_sessions(&self, user_id: &str, now: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM sessions WHERE user_id = ?1 AND expires_at < ?2",
                (user_id, now),
            )?;
            Ok(n)
        })
    }

    /// Swap the stored refresh token for a rotated one, extending expiry.
    pub fn rotate_session_token(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE sessions SET refresh_token = ?1, expires_at = ?2 WHERE refresh_token = ?3",
                (new_token, expires_at, old_token),
            )?;
            Ok(n == 1)
        })
    }

    pub fn count_sessions_for(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n: usize = conn.query_row(
                "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    // -- Reset codes --

    /// One code per email: requesting again replaces the previous code.
    pub fn upsert_reset_code(&self, email: &str, code: &str, expires_at: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reset_codes (email, code, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(email) DO UPDATE SET code = excluded.code,
                                                  expires_at = excluded.expires_at",
                (email, code, expires_at),
            )?;
            Ok(())
        })
    }

    pub fn get_reset_code(&self, email: &str) -> Result<Option<ResetCodeRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT email, code, expires_at FROM reset_codes WHERE email = ?1",
                    [email],
                    |row| {
                        Ok(ResetCodeRow {
                            email: row.get(0)?,
                            code: row.get(1)?,
                            expires_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn delete_reset_code(&self, email: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM reset_codes WHERE email = ?1", [email])?;
            Ok(n > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a fixed identifier supplied by this module, never user input.
    let sql = format!(
        "SELECT id, username, email, password_hash, agreed_to_terms, email_verified,
                is_subscribed, subscription_ref, customer_ref, trial_ends_at,
                created_at, updated_at
         FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                agreed_to_terms: row.get(4)?,
                email_verified: row.get(5)?,
                is_subscribed: row.get(6)?,
                subscription_ref: row.get(7)?,
                customer_ref: row.get(8)?,
                trial_ends_at: row.get(9)?,
                created_at: row.get(10)?,
                updated_at: row.get(11)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        refresh_token: row.get(2)?,
        user_agent: row.get(3)?,
        ip_address: row.get(4)?,
        created_at: row.get(5)?,
        expires_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_ts;
    use chrono::{Duration, SecondsFormat, Utc};

    fn ts_in(delta: Duration) -> String {
        (Utc::now() + delta).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn test_user(id: &str, email: &str) -> UserRow {
        let now = now_ts();
        UserRow {
            id: id.to_string(),
            username: "tester".to_string(),
            email: email.to_string(),
            password_hash: "$argon2-placeholder".to_string(),
            agreed_to_terms: true,
            email_verified: false,
            is_subscribed: false,
            subscription_ref: None,
            customer_ref: None,
            trial_ends_at: ts_in(Duration::days(7)),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    fn test_session(id: &str, user_id: &str, token: &str, expires_at: String) -> SessionRow {
        SessionRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            refresh_token: token.to_string(),
            user_agent: Some("tests".to_string()),
            ip_address: None,
            created_at: now_ts(),
            expires_at,
        }
    }

    #[test]
    fn user_lookup_by_email_and_id() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "a@x.com")).unwrap();

        assert!(db.get_user_by_email("a@x.com").unwrap().is_some());
        assert!(db.get_user_by_email("b@x.com").unwrap().is_none());
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().email, "a@x.com");
    }

    #[test]
    fn duplicate_email_rejected_by_constraint() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "a@x.com")).unwrap();
        assert!(db.create_user(&test_user("u2", "a@x.com")).is_err());
    }

    #[test]
    fn active_session_excludes_expired() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "a@x.com")).unwrap();

        db.create_session(&test_session("s1", "u1", "live", ts_in(Duration::days(7))))
            .unwrap();
        db.create_session(&test_session("s2", "u1", "stale", ts_in(Duration::days(-1))))
            .unwrap();

        let now = now_ts();
        assert!(db.get_active_session("live", &now).unwrap().is_some());
        assert!(db.get_active_session("stale", &now).unwrap().is_none());
        assert!(db.get_active_session("missing", &now).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_reaped_for_one_user_only() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "a@x.com")).unwrap();
        db.create_user(&test_user("u2", "b@x.com")).unwrap();

        db.create_session(&test_session("s1", "u1", "t1", ts_in(Duration::days(-1))))
            .unwrap();
        db.create_session(&test_session("s2", "u1", "t2", ts_in(Duration::days(7))))
            .unwrap();
        db.create_session(&test_session("s3", "u2", "t3", ts_in(Duration::days(-1))))
            .unwrap();

        let reaped = db.delete_expired_sessions("u1", &now_ts()).unwrap();
        assert_eq!(reaped, 1);
        assert_eq!(db.count_sessions_for("u1").unwrap(), 1);
        assert_eq!(db.count_sessions_for("u2").unwrap(), 1);
    }

    #[test]
    fn delete_session_is_not_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "a@x.com")).unwrap();
        db.create_session(&test_session("s1", "u1", "tok", ts_in(Duration::days(7))))
            .unwrap();

        assert!(db.delete_session_by_token("tok").unwrap());
        assert!(!db.delete_session_by_token("tok").unwrap());
    }

    #[test]
    fn rotate_swaps_token_in_place() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&test_user("u1", "a@x.com")).unwrap();
        db.create_session(&test_session("s1", "u1", "old", ts_in(Duration::days(1))))
            .unwrap();

        let later = ts_in(Duration::days(7));
        assert!(db.rotate_session_token("old", "new", &later).unwrap());

        let now = now_ts();
        assert!(db.get_active_session("old", &now).unwrap().is_none());
        let rotated = db.get_active_session("new", &now).unwrap().unwrap();
        assert_eq!(rotated.expires_at, later);
    }

    #[test]
    fn reset_code_upsert_replaces_and_delete_consumes() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_reset_code("a@x.com", "111111", &ts_in(Duration::minutes(15)))
            .unwrap();
        db.upsert_reset_code("a@x.com", "222222", &ts_in(Duration::minutes(15)))
            .unwrap();

        let row = db.get_reset_code("a@x.com").unwrap().unwrap();
        assert_eq!(row.code, "222222");

        assert!(db.delete_reset_code("a@x.com").unwrap());
        assert!(db.get_reset_code("a@x.com").unwrap().is_none());
        assert!(!db.delete_reset_code("a@x.com").unwrap());
    }
}
