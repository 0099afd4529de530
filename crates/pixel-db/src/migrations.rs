use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                username        TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE channels (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                description     TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE posts (
                id              TEXT PRIMARY KEY,
                body            TEXT NOT NULL,
                channel_id      TEXT NOT NULL REFERENCES channels(id),
                owner_id        TEXT REFERENCES users(id),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_posts_channel ON posts(channel_id, created_at);

            CREATE TABLE sessions (
                id_hash         TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL,
                last_seen_at    TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_last_seen ON sessions(last_seen_at);

            -- Seed the default channels
            INSERT INTO channels (id, name, description) VALUES
                ('00000000-0000-0000-0000-000000000001', 'Playstation', 'the playstation channel'),
                ('00000000-0000-0000-0000-000000000002', 'Xbox', 'the xbox channel'),
                ('00000000-0000-0000-0000-000000000003', 'Nintendo', 'the nintendo channel'),
                ('00000000-0000-0000-0000-000000000004', 'PC', 'the pc channel');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
