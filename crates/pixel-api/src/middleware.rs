use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use chrono::Utc;
use tracing::debug;

use pixel_types::models::Identity;

use crate::auth::AppState;
use crate::error::{ApiError, Rejection, run_blocking};

pub const SESSION_COOKIE: &str = "pixel_session";

/// The bearer credential for this request: the session cookie if present,
/// otherwise an `Authorization: Bearer` token.
pub fn session_artifact(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_owned())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .typed_get::<Authorization<Bearer>>()
                .map(|auth| auth.token().to_owned())
        })
}

/// Resolves an artifact to the identity it was issued for.
pub async fn authenticate(
    state: &AppState,
    artifact: Option<String>,
) -> Result<Identity, ApiError> {
    let token = artifact.ok_or(ApiError::Unauthenticated(Rejection::MissingArtifact))?;

    let st = state.clone();
    run_blocking(move || {
        let user_id = st.sessions.resolve(&st.db, &token, Utc::now())?;
        let user = st
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(ApiError::Unauthenticated(Rejection::UnknownUser))?;
        Ok(Identity {
            user_id,
            username: user.username,
        })
    })
    .await
}

/// Rejects the request unless it carries a live session, then hands the
/// resolved `Identity` to the handler through request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let artifact = session_artifact(&jar, req.headers());
    let identity = authenticate(&state, artifact).await.inspect_err(|e| {
        if let ApiError::Unauthenticated(reason) = e {
            debug!("{} {} rejected: {}", req.method(), req.uri().path(), reason);
        }
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
