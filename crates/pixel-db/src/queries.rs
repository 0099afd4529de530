use crate::models::{ChannelRow, PostRow, SessionRow, UserRow};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ffi};

const POST_COLUMNS: &str = "p.id, p.body, p.channel_id, c.name, p.owner_id, u.username,
     p.created_at, p.updated_at
     FROM posts p
     JOIN channels c ON p.channel_id = c.id
     LEFT JOIN users u ON p.owner_id = u.id";

impl Database {
    // -- Users --

    /// Inserts a user. Returns `false` without writing anything when the
    /// username is already taken; any other constraint failure is an error.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password_hash) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                username,
            )
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                id,
            )
        })
    }

    pub fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(count as u64)
        })
    }

    // -- Channels --

    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at FROM channels ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_channel_by_name(&self, name: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, description, created_at FROM channels WHERE name = ?1",
                    [name],
                    channel_from_row,
                )
                .optional()?)
        })
    }

    pub fn get_channel_by_id(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, description, created_at FROM channels WHERE id = ?1",
                    [id],
                    channel_from_row,
                )
                .optional()?)
        })
    }

    // -- Posts --

    pub fn insert_post(
        &self,
        id: &str,
        body: &str,
        channel_id: &str,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let now = format_timestamp(now);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, body, channel_id, owner_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id, body, channel_id, owner_id, now],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POST_COLUMNS} WHERE p.id = ?1");
            Ok(conn.query_row(&sql, [id], post_from_row).optional()?)
        })
    }

    /// Posts in one channel, newest first.
    pub fn list_posts_in_channel(&self, channel_id: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql =
                format!("SELECT {POST_COLUMNS} WHERE p.channel_id = ?1 ORDER BY p.created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([channel_id], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every post across all channels, newest first.
    pub fn list_posts(&self) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {POST_COLUMNS} ORDER BY p.created_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Rewrites body, channel and `updated_at`. Owner and `created_at` are
    /// never touched. Returns `false` if the post no longer exists.
    pub fn update_post(
        &self,
        id: &str,
        body: &str,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now = format_timestamp(now);
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET body = ?2, channel_id = ?3, updated_at = ?4 WHERE id = ?1",
                rusqlite::params![id, body, channel_id, now],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? > 0))
    }

    // -- Sessions --

    pub fn create_session(&self, id_hash: &str, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let now = format_timestamp(now);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id_hash, user_id, created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?3)",
                rusqlite::params![id_hash, user_id, now],
            )?;
            Ok(())
        })
    }

    pub fn get_session(&self, id_hash: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, created_at, last_seen_at FROM sessions WHERE id_hash = ?1",
                    [id_hash],
                    |row| {
                        Ok(SessionRow {
                            user_id: row.get(0)?,
                            created_at: row.get(1)?,
                            last_seen_at: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
    }

    pub fn touch_session(&self, id_hash: &str, now: DateTime<Utc>) -> Result<()> {
        let now = format_timestamp(now);
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET last_seen_at = ?2 WHERE id_hash = ?1",
                rusqlite::params![id_hash, now],
            )?;
            Ok(())
        })
    }

    pub fn delete_session(&self, id_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE id_hash = ?1", [id_hash])? > 0)
        })
    }

    /// Removes every session last seen before `cutoff`.
    pub fn delete_idle_sessions(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_timestamp(cutoff);
        self.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM sessions WHERE last_seen_at < ?1", [cutoff])?)
        })
    }
}

fn query_user(conn: &Connection, sql: &str, key: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(sql, [key], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        body: row.get(1)?,
        channel_id: row.get(2)?,
        channel_name: row.get(3)?,
        owner_id: row.get(4)?,
        owner_username: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
