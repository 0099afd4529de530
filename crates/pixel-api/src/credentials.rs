use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::warn;
use uuid::Uuid;

use pixel_types::models::Identity;

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=128;

/// Argon2id hashing with a fixed cost. Every verification, including the
/// ones for unknown usernames, runs a full hash comparison at that cost.
#[derive(Clone)]
pub struct CredentialStore {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl CredentialStore {
    pub fn new(params: Params) -> anyhow::Result<Self> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let filler = Uuid::new_v4().to_string();
        let dummy_hash = hash_with(&argon2, &filler)?;
        Ok(Self { argon2, dummy_hash })
    }

    /// OWASP-recommended Argon2id parameters (19 MiB, 2 passes).
    pub fn with_default_params() -> anyhow::Result<Self> {
        Self::new(Params::default())
    }

    pub fn hash(&self, password: &str) -> anyhow::Result<String> {
        hash_with(&self.argon2, password)
    }

    /// Checks `password` against `stored`. With no stored hash the dummy hash
    /// is checked instead and the result discarded.
    pub fn check(&self, password: &str, stored: Option<&str>) -> bool {
        let target = stored.unwrap_or(self.dummy_hash.as_str());
        let parsed = match PasswordHash::new(target) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password hash is unreadable: {}", e);
                return false;
            }
        };
        let matches = self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
        stored.is_some() && matches
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn validate(username: &str, password: &str) -> Result<(), ApiError> {
    if !USERNAME_LEN.contains(&username.chars().count()) {
        return Err(ApiError::BadRequest("username must be 3 to 32 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ApiError::BadRequest(
            "username may only contain letters, digits, '_', '-' and '.'",
        ));
    }
    if !PASSWORD_LEN.contains(&password.chars().count()) {
        return Err(ApiError::BadRequest("password must be 6 to 128 characters"));
    }
    Ok(())
}

/// Creates a user with a freshly salted hash. A name that is taken, either
/// before hashing or by a concurrent registration, yields `DuplicateUsername`
/// and writes nothing.
pub async fn register(state: &AppState, username: &str, password: &str) -> Result<Uuid, ApiError> {
    validate(username, password)?;

    let st = state.clone();
    let name = username.to_owned();
    let taken = run_blocking(move || Ok(st.db.get_user_by_username(&name)?.is_some())).await?;
    if taken {
        return Err(ApiError::DuplicateUsername);
    }

    let st = state.clone();
    let name = username.to_owned();
    let secret = password.to_owned();
    run_blocking(move || {
        let password_hash = st.credentials.hash(&secret).map_err(ApiError::Internal)?;
        let user_id = Uuid::new_v4();
        if st.db.create_user(&user_id.to_string(), &name, &password_hash)? {
            Ok(user_id)
        } else {
            Err(ApiError::DuplicateUsername)
        }
    })
    .await
}

/// Resolves a username/password pair to an identity. Unknown users and wrong
/// passwords are indistinguishable to the caller.
pub async fn verify(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<Identity, ApiError> {
    let st = state.clone();
    let name = username.to_owned();
    let secret = password.to_owned();
    run_blocking(move || {
        let user = st.db.get_user_by_username(&name)?;
        let stored = user.as_ref().map(|u| u.password_hash.as_str());
        if !st.credentials.check(&secret, stored) {
            return Err(ApiError::InvalidCredentials);
        }
        let user = user.ok_or(ApiError::InvalidCredentials)?;
        let user_id = user.id.parse::<Uuid>().map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))
        })?;
        Ok(Identity {
            user_id,
            username: user.username,
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_state;

    #[test]
    fn hash_is_salted_and_checkable() {
        let store = CredentialStore::new(Params::new(1024, 1, 1, None).unwrap()).unwrap();
        let a = store.hash("secret1").unwrap();
        let b = store.hash("secret1").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(!a.contains("secret1"));

        assert!(store.check("secret1", Some(&a)));
        assert!(!store.check("secret2", Some(&a)));
        assert!(!store.check("secret1", Some("not-a-phc-string")));
        assert!(!store.check("secret1", None));
    }

    #[tokio::test]
    async fn register_then_verify() {
        let state = test_state();
        let user_id = register(&state, "alice", "secret1").await.unwrap();

        let identity = verify(&state, "alice", "secret1").await.unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "alice");

        let stored = state.db.get_user_by_username("alice").unwrap().unwrap();
        assert_ne!(stored.password_hash, "secret1");
    }

    #[tokio::test]
    async fn duplicate_registration_creates_nothing() {
        let state = test_state();
        register(&state, "alice", "secret1").await.unwrap();

        let err = register(&state, "alice", "another1").await.unwrap_err();
        assert!(matches!(err, ApiError::DuplicateUsername));
        assert_eq!(state.db.count_users().unwrap(), 1);
        verify(&state, "alice", "secret1").await.unwrap();
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let state = test_state();
        register(&state, "alice", "secret1").await.unwrap();

        let wrong = verify(&state, "alice", "secret2").await.unwrap_err();
        let unknown = verify(&state, "mallory", "secret1").await.unwrap_err();
        assert!(matches!(wrong, ApiError::InvalidCredentials));
        assert!(matches!(unknown, ApiError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_hashing() {
        let state = test_state();
        let cases = [("al", "secret1"), ("alice bob", "secret1"), ("alice", "short")];
        for (username, password) in cases {
            let err = register(&state, username, password).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{username}/{password}");
        }
        assert_eq!(state.db.count_users().unwrap(), 0);
    }
}
