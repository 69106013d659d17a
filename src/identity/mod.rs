//! Identity service
//!
//! Email + password accounts stored in the `accounts` collection, bearer
//! sessions held in memory, and a broadcast of auth-state changes.
//!
//! - **password**: Argon2id hashing

pub mod password;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, OnceCell, RwLock};

use crate::storage::{collections, to_fields, DocumentStore, Query, StorageError};

pub use password::{hash_password, verify_password};

/// Identity errors
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error("Email address is already in use")]
    EmailInUse,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Identity service settings
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub session_ttl: Duration,
    pub min_password_length: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(7 * 24 * 3600),
            min_password_length: 6,
        }
    }
}

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

/// A bearer session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: AuthUser,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Auth-state change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn { uid: String, token: String },
    SignedOut { uid: String, token: String },
}

/// Stored account record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    #[serde(default, skip_serializing)]
    id: String,
    email: String,
    password_hash: String,
    created_at: String,
}

/// Accounts, sessions and auth-state notifications
pub struct IdentityService {
    store: Arc<dyn DocumentStore>,
    config: IdentityConfig,
    sessions: RwLock<HashMap<String, Session>>,
    events: broadcast::Sender<AuthEvent>,
    email_pattern: Regex,
    /// Serializes account creation so an email cannot be registered twice
    signup_lock: Mutex<()>,
    /// Hash checked on sign-in for unknown emails, so both paths cost the same
    dummy_hash: OnceCell<String>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn DocumentStore>, config: IdentityConfig) -> IdentityResult<Self> {
        let email_pattern = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")
            .map_err(|e| IdentityError::InvalidEmail(e.to_string()))?;
        let (events, _) = broadcast::channel(256);

        Ok(Self {
            store,
            config,
            sessions: RwLock::new(HashMap::new()),
            events,
            email_pattern,
            signup_lock: Mutex::new(()),
            dummy_hash: OnceCell::new(),
        })
    }

    /// Create an account and sign the new user in
    pub async fn create_account(&self, email: &str, password: &str) -> IdentityResult<Session> {
        let email = self.normalize_email(email)?;

        if password.chars().count() < self.config.min_password_length {
            return Err(IdentityError::WeakPassword {
                min: self.config.min_password_length,
            });
        }

        let _guard = self.signup_lock.lock().await;

        if self.find_account(&email).await?.is_some() {
            return Err(IdentityError::EmailInUse);
        }

        let password_hash = hash_blocking(password.to_string()).await?;
        let record = AccountRecord {
            id: String::new(),
            email: email.clone(),
            password_hash,
            created_at: crate::timestamp_now(),
        };

        let doc = self.store.add(collections::ACCOUNTS, to_fields(&record)?).await?;
        tracing::info!(uid = %doc.id, "Account created");

        Ok(self
            .start_session(AuthUser {
                uid: doc.id,
                email,
            })
            .await)
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session> {
        let email = email.trim().to_lowercase();

        let account = self.find_account(&email).await?;
        let hash = match &account {
            Some(account) => account.password_hash.clone(),
            None => self.dummy_hash().await?,
        };

        let candidate = password.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&candidate, &hash))
            .await
            .map_err(|e| IdentityError::Hashing(e.to_string()))??;

        let account = match account {
            Some(account) if valid => account,
            Some(account) => {
                tracing::debug!(uid = %account.id, "Rejected sign-in");
                return Err(IdentityError::InvalidCredentials);
            }
            None => return Err(IdentityError::InvalidCredentials),
        };

        Ok(self
            .start_session(AuthUser {
                uid: account.id,
                email: account.email,
            })
            .await)
    }

    async fn dummy_hash(&self) -> IdentityResult<String> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| async {
                tokio::task::spawn_blocking(|| hash_password("corpsnet-no-such-account"))
                    .await
                    .map_err(|e| IdentityError::Hashing(e.to_string()))?
            })
            .await?;
        Ok(hash.clone())
    }

    /// End a session. Unknown tokens are ignored.
    pub async fn sign_out(&self, token: &str) -> bool {
        let removed = self.sessions.write().await.remove(token);
        match removed {
            Some(session) => {
                tracing::info!(uid = %session.user.uid, "Signed out");
                self.announce(AuthEvent::SignedOut {
                    uid: session.user.uid,
                    token: session.token,
                });
                true
            }
            None => false,
        }
    }

    /// Look up a live session, evicting it if it has expired
    pub async fn current_session(&self, token: &str) -> Option<Session> {
        let session = self.sessions.read().await.get(token).cloned()?;
        if !session.is_expired() {
            return Some(session);
        }

        self.sign_out(token).await;
        None
    }

    /// Drop every expired session. Returns how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let expired: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_expired())
            .map(|s| s.token.clone())
            .collect();

        let mut evicted = 0;
        for token in expired {
            if self.sign_out(&token).await {
                evicted += 1;
            }
        }
        evicted
    }

    /// Receive auth-state changes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn normalize_email(&self, email: &str) -> IdentityResult<String> {
        let email = email.trim().to_lowercase();
        if !self.email_pattern.is_match(&email) {
            return Err(IdentityError::InvalidEmail(email));
        }
        Ok(email)
    }

    async fn find_account(&self, email: &str) -> IdentityResult<Option<AccountRecord>> {
        let query = Query::collection(collections::ACCOUNTS)
            .where_eq("email", email)
            .limit(1);

        match self.store.query(&query).await?.first() {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    async fn start_session(&self, user: AuthUser) -> Session {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.config.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(7));

        let session = Session {
            token: generate_token(),
            user,
            created_at: now,
            expires_at: now + ttl,
        };

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        self.announce(AuthEvent::SignedIn {
            uid: session.user.uid.clone(),
            token: session.token.clone(),
        });
        session
    }

    fn announce(&self, event: AuthEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

async fn hash_blocking(password: String) -> IdentityResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| IdentityError::Hashing(e.to_string()))?
}

/// Generate a random 32-byte hex token
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    let mut token = String::with_capacity(64);
    for b in bytes {
        let _ = write!(token, "{:02x}", b);
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;

    async fn service() -> IdentityService {
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::in_memory().await);
        IdentityService::new(store, IdentityConfig::default()).unwrap()
    }

    #[test]
    fn test_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_create_account_signs_in() {
        let identity = service().await;
        let mut events = identity.subscribe();

        let session = identity
            .create_account("  Ada@Example.COM ", "secret1")
            .await
            .unwrap();
        assert_eq!(session.user.email, "ada@example.com");

        let current = identity.current_session(&session.token).await.unwrap();
        assert_eq!(current.user, session.user);

        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedIn {
                uid: session.user.uid.clone(),
                token: session.token.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_account_validation() {
        let identity = service().await;

        assert!(matches!(
            identity.create_account("not-an-email", "secret1").await,
            Err(IdentityError::InvalidEmail(_))
        ));
        assert!(matches!(
            identity.create_account("a@b.ng", "12345").await,
            Err(IdentityError::WeakPassword { min: 6 })
        ));

        identity.create_account("a@b.ng", "123456").await.unwrap();
        assert!(matches!(
            identity.create_account("A@B.NG", "abcdef").await,
            Err(IdentityError::EmailInUse)
        ));
    }

    #[tokio::test]
    async fn test_sign_in() {
        let identity = service().await;
        let created = identity.create_account("ada@example.com", "secret1").await.unwrap();

        let session = identity.sign_in("ADA@example.com", "secret1").await.unwrap();
        assert_eq!(session.user.uid, created.user.uid);
        assert_ne!(session.token, created.token);

        assert!(matches!(
            identity.sign_in("ada@example.com", "wrong!!").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            identity.sign_in("nobody@example.com", "secret1").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unknown_email_still_verifies_a_hash() {
        let identity = service().await;
        assert!(identity.dummy_hash.get().is_none());

        assert!(matches!(
            identity.sign_in("nobody@example.com", "secret1").await,
            Err(IdentityError::InvalidCredentials)
        ));
        let hash = identity.dummy_hash.get().cloned().unwrap();
        assert!(hash.starts_with("$argon2id$"));

        // Same hash is reused for later unknown emails
        identity.sign_in("ghost@example.com", "secret1").await.unwrap_err();
        assert_eq!(identity.dummy_hash.get(), Some(&hash));
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_session() {
        let identity = service().await;
        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();
        let mut events = identity.subscribe();

        assert!(identity.sign_out(&session.token).await);
        assert!(identity.current_session(&session.token).await.is_none());
        assert!(!identity.sign_out(&session.token).await);

        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::SignedOut {
                uid: session.user.uid,
                token: session.token
            }
        );
    }

    #[tokio::test]
    async fn test_expired_sessions_are_evicted() {
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::in_memory().await);
        let identity = IdentityService::new(
            store,
            IdentityConfig {
                session_ttl: Duration::from_secs(0),
                min_password_length: 6,
            },
        )
        .unwrap();

        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();
        assert!(identity.current_session(&session.token).await.is_none());
        assert_eq!(identity.session_count().await, 0);

        identity.sign_in("ada@example.com", "secret1").await.unwrap();
        assert_eq!(identity.evict_expired().await, 1);
    }
}
