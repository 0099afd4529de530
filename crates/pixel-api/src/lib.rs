pub mod auth;
pub mod channels;
pub mod credentials;
pub mod error;
pub mod middleware;
pub mod policy;
pub mod posts;
pub mod session;


use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// The full HTTP surface. Reads are public; `/dashboard` and every post
/// mutation sit behind `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/channels", get(channels::list_channels))
        .route("/channels/{name}", get(channels::channel_posts))
        .route("/posts/{id}", get(posts::get_post))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/dashboard", get(posts::dashboard))
        .route("/add-post", post(posts::create_post))
        .route("/edit-post/{id}", put(posts::edit_post))
        .route("/delete-post/{id}", delete(posts::delete_post))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
