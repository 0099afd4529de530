use pixel_types::models::{Identity, Post};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn require(self) -> Result<(), ApiError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny => Err(ApiError::Forbidden),
        }
    }
}

/// Edit and delete are reserved to the post's owner. A post with no recorded
/// owner cannot be mutated by anyone.
pub fn authorize_mutation(identity: &Identity, post: &Post) -> Decision {
    match post.owner_id {
        Some(owner) if owner == identity.user_id => Decision::Allow,
        _ => Decision::Deny,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            username: name.into(),
        }
    }

    fn post_owned_by(owner_id: Option<Uuid>) -> Post {
        let now = Utc::now();
        Post {
            id: Uuid::new_v4(),
            body: "hello".into(),
            channel_id: Uuid::new_v4(),
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_may_mutate() {
        let alice = identity("alice");
        let post = post_owned_by(Some(alice.user_id));
        assert_eq!(authorize_mutation(&alice, &post), Decision::Allow);
        assert!(authorize_mutation(&alice, &post).require().is_ok());
    }

    #[test]
    fn everyone_else_is_denied() {
        let alice = identity("alice");
        let post = post_owned_by(Some(alice.user_id));
        for _ in 0..16 {
            let other = identity("bob");
            assert_eq!(authorize_mutation(&other, &post), Decision::Deny);
        }

        // Same username, different account.
        let impostor = identity("alice");
        assert!(matches!(
            authorize_mutation(&impostor, &post).require(),
            Err(ApiError::Forbidden)
        ));
    }

    #[test]
    fn missing_owner_denies_everyone() {
        let post = post_owned_by(None);
        assert_eq!(authorize_mutation(&identity("alice"), &post), Decision::Deny);
    }
}
