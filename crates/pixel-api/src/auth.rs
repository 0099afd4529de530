use std::sync::Arc;

use axum::{
    Form,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use tracing::{info, warn};

use pixel_db::Database;
use pixel_types::api::{LoginRequest, RegisterRequest};

use crate::credentials::{self, CredentialStore};
use crate::error::{ApiError, run_blocking};
use crate::middleware::{SESSION_COOKIE, session_artifact};
use crate::session::SessionIssuer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub credentials: CredentialStore,
    pub sessions: SessionIssuer,
    pub cookie_secure: bool,
}

/// Session settings supplied by the server binary.
#[derive(Clone)]
pub struct AuthSettings {
    pub session_secret: String,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub cookie_secure: bool,
}

impl AppStateInner {
    /// Builds the shared state with production hashing cost. Computing the
    /// dummy hash makes this take as long as one password hash.
    pub fn new(db: Database, settings: &AuthSettings) -> anyhow::Result<Self> {
        Ok(Self {
            db,
            credentials: CredentialStore::with_default_params()?,
            sessions: SessionIssuer::new(
                &settings.session_secret,
                settings.idle_timeout,
                settings.max_lifetime,
            ),
            cookie_secure: settings.cookie_secure,
        })
    }
}

/// 302 with a `Location` header.
fn found(location: &'static str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, HeaderValue::from_static(location))],
    )
        .into_response()
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub async fn register(
    State(state): State<AppState>,
    Form(req): Form<RegisterRequest>,
) -> Result<Response, ApiError> {
    match credentials::register(&state, &req.username, &req.password).await {
        Ok(user_id) => {
            info!("Registered user {} ({})", req.username, user_id);
            Ok(found("/login"))
        }
        Err(ApiError::DuplicateUsername) => Ok(found("/register?error=username_taken")),
        Err(e) => Err(e),
    }
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<LoginRequest>,
) -> Result<Response, ApiError> {
    let identity = match credentials::verify(&state, &req.username, &req.password).await {
        Ok(identity) => identity,
        Err(ApiError::InvalidCredentials) => {
            warn!("Failed login attempt for '{}'", req.username);
            return Ok(found("/login?error=invalid_credentials"));
        }
        Err(e) => return Err(e),
    };

    let st = state.clone();
    let user_id = identity.user_id;
    let token = run_blocking(move || Ok(st.sessions.create(&st.db, user_id, Utc::now())?)).await?;

    info!("User {} logged in", identity.username);
    let jar = jar.add(session_cookie(token, state.cookie_secure));
    Ok((jar, found("/dashboard")).into_response())
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_artifact(&jar, &headers) {
        let st = state.clone();
        let revoked = run_blocking(move || Ok(st.sessions.revoke(&st.db, &token)?)).await?;
        if revoked {
            info!("Session revoked on logout");
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, found("/login")).into_response())
}
