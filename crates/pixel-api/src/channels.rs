use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;

use pixel_db::models::ChannelRow;
use pixel_types::api::{ChannelPostsResponse, ChannelResponse};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::posts::to_response;

fn to_channel(row: ChannelRow) -> ChannelResponse {
    ChannelResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt channel id '{}': {}", row.id, e);
            Default::default()
        }),
        name: row.name,
        description: row.description,
    }
}

pub async fn list_channels(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let rows = run_blocking(move || Ok(state.db.list_channels()?)).await?;
    Ok(Json(rows.into_iter().map(to_channel).collect::<Vec<_>>()))
}

/// A channel and its posts, newest first. Open to anonymous visitors.
pub async fn channel_posts(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (channel, posts) = run_blocking(move || {
        let channel = state.db.get_channel_by_name(&name)?.ok_or(ApiError::NotFound)?;
        let posts = state.db.list_posts_in_channel(&channel.id)?;
        Ok((channel, posts))
    })
    .await?;

    Ok(Json(ChannelPostsResponse {
        channel: to_channel(channel),
        posts: posts.into_iter().map(to_response).collect(),
    }))
}
