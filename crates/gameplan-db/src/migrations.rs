use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            agreed_to_terms INTEGER NOT NULL DEFAULT 0,
            email_verified  INTEGER NOT NULL DEFAULT 0,
            is_subscribed   INTEGER NOT NULL DEFAULT 0,
            subscription_ref TEXT,
            customer_ref     TEXT,
            trial_ends_at   TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            refresh_token TEXT NOT NULL,
            user_agent    TEXT,
            ip_address    TEXT,
            created_at    TEXT NOT NULL,
            expires_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_user
            ON sessions(user_id, expires_at);
        CREATE INDEX IF NOT EXISTS idx_sessions_token
            ON sessions(refresh_token);

        CREATE TABLE IF NOT EXISTS reset_codes (
            email      TEXT PRIMARY KEY,
            code       TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plans (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title       TEXT NOT NULL,
            description TEXT,
            start_date  TEXT,
            end_date    TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_plans_user
            ON plans(user_id, created_at);

        CREATE TABLE IF NOT EXISTS classes (
            id            TEXT PRIMARY KEY,
            user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title         TEXT NOT NULL,
            description   TEXT,
            schedule_info TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_classes_user
            ON classes(user_id, created_at);

        CREATE TABLE IF NOT EXISTS class_plans (
            class_id TEXT NOT NULL REFERENCES classes(id) ON DELETE CASCADE,
            plan_id  TEXT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
            UNIQUE(class_id, plan_id)
        );

        -- pair_key is the canonical sorted participant pair; the UNIQUE
        -- constraint is what guarantees one chat per pair under concurrent
        -- first contact.
        CREATE TABLE IF NOT EXISTS chats (
            id         TEXT PRIMARY KEY,
            pair_key   TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chats_updated
            ON chats(updated_at);

        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id),
            UNIQUE(chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON chat_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        -- Seed the AI coach identity. The password hash is unparseable on
        -- purpose: this account can never log in.
        INSERT OR IGNORE INTO users
            (id, username, email, password_hash, agreed_to_terms,
             email_verified, is_subscribed, trial_ends_at, created_at, updated_at)
        VALUES
            ('00000000-0000-0000-0000-0000000000a1', 'coach',
             'coach@gameplan.internal', '!', 1, 1, 0,
             '1970-01-01T00:00:00.000000Z',
             '1970-01-01T00:00:00.000000Z',
             '1970-01-01T00:00:00.000000Z');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
