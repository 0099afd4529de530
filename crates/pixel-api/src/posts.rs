use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use pixel_db::models::{ChannelRow, PostRow};
use pixel_db::{Database, parse_timestamp};
use pixel_types::api::{CreatePostRequest, DashboardResponse, EditPostRequest, PostResponse};
use pixel_types::models::{Identity, Post};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::policy::authorize_mutation;

const MAX_BODY_CHARS: usize = 10_000;

fn parse_id(raw: &str, what: &str, post_id: &str) -> Option<Uuid> {
    raw.parse()
        .inspect_err(|e| warn!("Corrupt {} '{}' on post '{}': {}", what, raw, post_id, e))
        .ok()
}

fn parse_time(raw: &str, what: &str, post_id: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt {} '{}' on post '{}'", what, raw, post_id);
        DateTime::default()
    })
}

/// Domain view of a stored post. An unreadable owner id becomes `None`, which
/// the policy treats as "nobody may mutate".
pub fn to_post(row: &PostRow) -> Post {
    Post {
        id: parse_id(&row.id, "id", &row.id).unwrap_or_default(),
        body: row.body.clone(),
        channel_id: parse_id(&row.channel_id, "channel_id", &row.id).unwrap_or_default(),
        owner_id: row
            .owner_id
            .as_deref()
            .and_then(|owner| parse_id(owner, "owner_id", &row.id)),
        created_at: parse_time(&row.created_at, "created_at", &row.id),
        updated_at: parse_time(&row.updated_at, "updated_at", &row.id),
    }
}

pub fn to_response(row: PostRow) -> PostResponse {
    let post = to_post(&row);
    PostResponse {
        id: post.id,
        body: post.body,
        channel_id: post.channel_id,
        channel_name: row.channel_name,
        owner_id: post.owner_id,
        owner_username: row.owner_username,
        created_at: post.created_at,
        updated_at: post.updated_at,
    }
}

fn validate_body(body: &str) -> Result<(), ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("post body is required"));
    }
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(ApiError::BadRequest("post body is too long"));
    }
    Ok(())
}

/// Post ids in the path that are not UUIDs cannot name a post.
fn parse_post_id(raw: &str) -> Result<Uuid, ApiError> {
    raw.parse().map_err(|_| ApiError::NotFound)
}

/// Looks a channel up by id when `key` parses as one, by name otherwise.
fn find_channel(db: &Database, key: &str) -> Result<ChannelRow, ApiError> {
    let channel = match key.parse::<Uuid>() {
        Ok(id) => db.get_channel_by_id(&id.to_string())?,
        Err(_) => db.get_channel_by_name(key)?,
    };
    channel.ok_or(ApiError::NotFound)
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let row = run_blocking(move || {
        state
            .db
            .get_post(&post_id.to_string())?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(to_response(row)))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(move || Ok(state.db.list_posts()?)).await?;

    Ok(Json(DashboardResponse {
        user: identity,
        posts: rows.into_iter().map(to_response).collect(),
    }))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_body(&req.body)?;

    let post_id = Uuid::new_v4();
    let owner_id = identity.user_id;
    let row = run_blocking(move || {
        let channel = find_channel(&state.db, &req.channel)?;
        let id = post_id.to_string();
        state
            .db
            .insert_post(&id, &req.body, &channel.id, &owner_id.to_string(), Utc::now())?;
        state.db.get_post(&id)?.ok_or(ApiError::NotFound)
    })
    .await?;

    info!("{} posted {} in {}", identity.username, post_id, row.channel_name);
    Ok((StatusCode::CREATED, Json(to_response(row))))
}

pub async fn edit_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<EditPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    validate_body(&req.body)?;

    let editor = identity.clone();
    let row = run_blocking(move || {
        let id = post_id.to_string();
        let current = state.db.get_post(&id)?.ok_or(ApiError::NotFound)?;
        authorize_mutation(&editor, &to_post(&current)).require()?;

        let channel_id = match req.channel.as_deref() {
            Some(key) => find_channel(&state.db, key)?.id,
            None => current.channel_id,
        };
        if !state.db.update_post(&id, &req.body, &channel_id, Utc::now())? {
            return Err(ApiError::NotFound);
        }
        state.db.get_post(&id)?.ok_or(ApiError::NotFound)
    })
    .await
    .inspect_err(|e| {
        if matches!(e, ApiError::Forbidden) {
            warn!("{} tried to edit post {} they do not own", identity.username, post_id);
        }
    })?;

    info!("{} edited post {}", identity.username, post_id);
    Ok(Json(to_response(row)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let post_id = parse_post_id(&post_id)?;
    let editor = identity.clone();
    run_blocking(move || {
        let id = post_id.to_string();
        let current = state.db.get_post(&id)?.ok_or(ApiError::NotFound)?;
        authorize_mutation(&editor, &to_post(&current)).require()?;

        if !state.db.delete_post(&id)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await
    .inspect_err(|e| {
        if matches!(e, ApiError::Forbidden) {
            warn!("{} tried to delete post {} they do not own", identity.username, post_id);
        }
    })?;

    info!("{} deleted post {}", identity.username, post_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(owner_id: Option<&str>) -> PostRow {
        PostRow {
            id: Uuid::new_v4().to_string(),
            body: "hello".into(),
            channel_id: "00000000-0000-0000-0000-000000000002".into(),
            channel_name: "Xbox".into(),
            owner_id: owner_id.map(str::to_owned),
            owner_username: owner_id.map(|_| "alice".to_owned()),
            created_at: "2026-10-15 08:30:00".into(),
            updated_at: "2026-10-15T09:00:00.000000Z".into(),
        }
    }

    #[test]
    fn corrupt_owner_reads_as_unowned() {
        let post = to_post(&row(Some("not-a-uuid")));
        assert!(post.owner_id.is_none());
    }

    #[test]
    fn response_keeps_names_and_parses_both_timestamp_formats() {
        let owner = Uuid::new_v4();
        let response = to_response(row(Some(&owner.to_string())));
        assert_eq!(response.owner_id, Some(owner));
        assert_eq!(response.owner_username.as_deref(), Some("alice"));
        assert_eq!(response.channel_name, "Xbox");
        assert!(response.updated_at > response.created_at);
    }

    #[test]
    fn malformed_post_id_is_not_found() {
        assert!(matches!(parse_post_id("not-a-uuid"), Err(ApiError::NotFound)));
        let id = Uuid::new_v4();
        assert_eq!(parse_post_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn body_validation() {
        assert!(validate_body("hello").is_ok());
        assert!(validate_body("   \n").is_err());
        assert!(validate_body(&"x".repeat(MAX_BODY_CHARS + 1)).is_err());
    }
}
