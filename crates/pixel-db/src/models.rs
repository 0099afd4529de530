//! Database row types. These map directly to SQLite rows and keep ids and
//! timestamps as stored text; conversion to `pixel-types` models happens in
//! the API layer.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: String,
}

/// A post joined with its channel name and owner username.
pub struct PostRow {
    pub id: String,
    pub body: String,
    pub channel_id: String,
    pub channel_name: String,
    pub owner_id: Option<String>,
    pub owner_username: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct SessionRow {
    pub user_id: String,
    pub created_at: String,
    pub last_seen_at: String,
}
