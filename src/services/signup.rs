//! Account signup

use serde::Deserialize;
use std::sync::Arc;

use super::profile::{ProfileService, UserProfile};
use super::{ServiceError, ServiceResult};
use crate::identity::{IdentityService, Session};

/// Signup form as submitted
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub state_code: String,
    pub batch: String,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("email", &self.email)
            .field("state_code", &self.state_code)
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

/// A new, signed-in user and their profile
#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub session: Session,
    pub profile: UserProfile,
}

#[derive(Clone)]
pub struct SignupService {
    identity: Arc<IdentityService>,
    profiles: ProfileService,
}

impl SignupService {
    pub fn new(identity: Arc<IdentityService>, profiles: ProfileService) -> Self {
        Self { identity, profiles }
    }

    /// Create the account, then the profile at `users/{uid}`
    pub async fn sign_up(&self, form: SignupForm) -> ServiceResult<SignupOutcome> {
        if form.password != form.confirm_password {
            return Err(ServiceError::Validation("Passwords do not match".to_string()));
        }

        let state_code = form.state_code.trim();
        let batch = form.batch.trim();
        if state_code.is_empty() {
            return Err(ServiceError::Validation("State code is required".to_string()));
        }
        if batch.is_empty() {
            return Err(ServiceError::Validation("Batch is required".to_string()));
        }

        let session = self
            .identity
            .create_account(&form.email, &form.password)
            .await?;
        let uid = session.user.uid.clone();

        let profile = UserProfile {
            id: uid.clone(),
            email: session.user.email.clone(),
            state_code: state_code.to_string(),
            batch: batch.to_string(),
            created_at: crate::timestamp_now(),
            location: None,
            lga: None,
        };

        let profile = match self.profiles.save(&uid, &profile).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::error!(uid = %uid, "Account created but profile write failed: {}", e);
                return Err(e);
            }
        };

        tracing::info!(uid = %uid, state_code = %profile.state_code, "Signed up");
        Ok(SignupOutcome { session, profile })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AuthEvent, IdentityConfig, IdentityError};
    use crate::storage::{collections, DocumentStore, LocalStore, Query};

    fn form(password: &str, confirm: &str) -> SignupForm {
        SignupForm {
            email: "ada@example.com".to_string(),
            password: password.to_string(),
            confirm_password: confirm.to_string(),
            state_code: "LA/24A/1234".to_string(),
            batch: "2024A".to_string(),
        }
    }

    async fn setup() -> (SignupService, Arc<IdentityService>, Arc<dyn DocumentStore>) {
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::in_memory().await);
        let identity =
            Arc::new(IdentityService::new(Arc::clone(&store), IdentityConfig::default()).unwrap());
        let signup = SignupService::new(
            Arc::clone(&identity),
            ProfileService::new(Arc::clone(&store)),
        );
        (signup, identity, store)
    }

    async fn count(store: &Arc<dyn DocumentStore>, collection: &str) -> usize {
        store.query(&Query::collection(collection)).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_sign_up_creates_account_and_profile() {
        let (signup, identity, store) = setup().await;

        let outcome = signup.sign_up(form("secret1", "secret1")).await.unwrap();
        assert_eq!(outcome.profile.id, outcome.session.user.uid);
        assert_eq!(outcome.profile.state_code, "LA/24A/1234");
        assert_eq!(outcome.profile.batch, "2024A");

        assert!(identity.current_session(&outcome.session.token).await.is_some());
        assert_eq!(count(&store, collections::ACCOUNTS).await, 1);

        let stored = store
            .get(collections::USERS, &outcome.session.user.uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_str("email"), Some("ada@example.com"));
        assert_eq!(stored.get_str("stateCode"), Some("LA/24A/1234"));
    }

    #[tokio::test]
    async fn test_password_mismatch_writes_nothing() {
        let (signup, identity, store) = setup().await;
        let mut events = identity.subscribe();

        let err = signup.sign_up(form("secret1", "secret2")).await.unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");

        assert_eq!(count(&store, collections::ACCOUNTS).await, 0);
        assert_eq!(count(&store, collections::USERS).await, 0);
        assert_eq!(identity.session_count().await, 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_required_fields() {
        let (signup, _, store) = setup().await;
        let mut missing_batch = form("secret1", "secret1");
        missing_batch.batch = "  ".to_string();

        assert!(matches!(
            signup.sign_up(missing_batch).await,
            Err(ServiceError::Validation(_))
        ));
        assert_eq!(count(&store, collections::ACCOUNTS).await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (signup, identity, _) = setup().await;
        signup.sign_up(form("secret1", "secret1")).await.unwrap();

        let mut events = identity.subscribe();
        assert!(matches!(
            signup.sign_up(form("secret1", "secret1")).await,
            Err(ServiceError::Identity(IdentityError::EmailInUse))
        ));
        assert!(!matches!(events.try_recv(), Ok(AuthEvent::SignedIn { .. })));
    }
}
