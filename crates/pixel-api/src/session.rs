use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use pixel_db::{Database, parse_timestamp};
use pixel_types::api::Claims;

use crate::error::{ApiError, Rejection};

/// Issues and resolves login sessions.
///
/// A session is a server-side row keyed by the SHA-256 of a random session
/// id. The client only ever holds an HS256-signed token naming that id, so a
/// forged or truncated cookie is rejected before the store is consulted and a
/// leaked `sessions` table cannot be replayed.
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    idle_timeout: Duration,
    max_lifetime: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, idle_timeout: Duration, max_lifetime: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            idle_timeout,
            max_lifetime,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Opens a session for `user_id` and returns the token to hand the client.
    pub fn create(
        &self,
        db: &Database,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let session_id = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());

        let claims = Claims {
            sub: user_id,
            sid: session_id,
            iat: now.timestamp() as usize,
            exp: (now + self.max_lifetime).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;

        db.create_session(&hash_session_id(&claims.sid), &user_id.to_string(), now)?;
        Ok(token)
    }

    /// Maps a presented token back to the user it was issued for and marks
    /// the session as seen at `now`. A session idle for longer than the
    /// configured timeout is deleted on the spot.
    pub fn resolve(
        &self,
        db: &Database,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Uuid, ApiError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                debug!("Rejected session token: {}", e);
                ApiError::Unauthenticated(Rejection::InvalidToken)
            })?
            .claims;

        let id_hash = hash_session_id(&claims.sid);
        let session = db
            .get_session(&id_hash)?
            .ok_or(ApiError::Unauthenticated(Rejection::SessionNotFound))?;

        let idle = parse_timestamp(&session.last_seen_at)
            .map(|last_seen| now - last_seen > self.idle_timeout)
            .unwrap_or(true);
        if idle {
            db.delete_session(&id_hash)?;
            return Err(ApiError::Unauthenticated(Rejection::SessionExpired));
        }

        if session.user_id != claims.sub.to_string() {
            return Err(ApiError::Unauthenticated(Rejection::InvalidToken));
        }

        db.touch_session(&id_hash, now)?;
        Ok(claims.sub)
    }

    /// Ends the session named by `token`. Tokens past their `exp` can still
    /// be revoked; unreadable tokens are ignored.
    pub fn revoke(&self, db: &Database, token: &str) -> anyhow::Result<bool> {
        let mut validation = Validation::default();
        validation.validate_exp = false;

        match decode::<Claims>(token, &self.decoding, &validation) {
            Ok(data) => db.delete_session(&hash_session_id(&data.claims.sid)),
            Err(_) => Ok(false),
        }
    }
}

fn hash_session_id(session_id: &str) -> String {
    hex::encode(Sha256::digest(session_id.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, SessionIssuer, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "alice", "$argon2id$stub").unwrap();
        let issuer = SessionIssuer::new("test-secret", Duration::hours(24), Duration::days(30));
        (db, issuer, user_id)
    }

    #[test]
    fn create_then_resolve_returns_user() {
        let (db, issuer, user_id) = setup();
        let now = Utc::now();
        let token = issuer.create(&db, user_id, now).unwrap();
        assert_eq!(issuer.resolve(&db, &token, now).unwrap(), user_id);
    }

    #[test]
    fn session_id_is_not_stored_in_clear() {
        let (db, issuer, user_id) = setup();
        let token = issuer.create(&db, user_id, Utc::now()).unwrap();
        let claims = decode::<Claims>(&token, &issuer.decoding, &Validation::default())
            .unwrap()
            .claims;

        assert!(db.get_session(&claims.sid).unwrap().is_none());
        assert!(db.get_session(&hash_session_id(&claims.sid)).unwrap().is_some());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let (db, issuer, user_id) = setup();
        let forger = SessionIssuer::new("guessed-secret", Duration::hours(24), Duration::days(30));
        let token = forger.create(&db, user_id, Utc::now()).unwrap();

        let err = issuer.resolve(&db, &token, Utc::now()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(Rejection::InvalidToken)));

        let err = issuer.resolve(&db, "garbage", Utc::now()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(Rejection::InvalidToken)));
    }

    #[test]
    fn revoked_session_is_not_found() {
        let (db, issuer, user_id) = setup();
        let now = Utc::now();
        let token = issuer.create(&db, user_id, now).unwrap();

        assert!(issuer.revoke(&db, &token).unwrap());
        assert!(!issuer.revoke(&db, &token).unwrap());
        assert!(!issuer.revoke(&db, "garbage").unwrap());

        let err = issuer.resolve(&db, &token, now).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(Rejection::SessionNotFound)));
    }

    #[test]
    fn idle_session_expires_and_is_removed() {
        let (db, issuer, user_id) = setup();
        let t0 = Utc::now();
        let token = issuer.create(&db, user_id, t0).unwrap();

        // Activity inside the window slides it forward.
        let t1 = t0 + Duration::hours(20);
        assert_eq!(issuer.resolve(&db, &token, t1).unwrap(), user_id);
        let t2 = t1 + Duration::hours(20);
        assert_eq!(issuer.resolve(&db, &token, t2).unwrap(), user_id);

        let t3 = t2 + Duration::hours(25);
        let err = issuer.resolve(&db, &token, t3).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(Rejection::SessionExpired)));

        let err = issuer.resolve(&db, &token, t3).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(Rejection::SessionNotFound)));
    }

    #[test]
    fn token_past_max_lifetime_is_rejected() {
        let (db, _, user_id) = setup();
        let short = SessionIssuer::new("test-secret", Duration::hours(24), Duration::hours(-1));
        let token = short.create(&db, user_id, Utc::now()).unwrap();

        let err = short.resolve(&db, &token, Utc::now()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(Rejection::InvalidToken)));
        assert!(short.revoke(&db, &token).unwrap());
    }
}
