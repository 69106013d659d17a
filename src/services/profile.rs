//! User profiles and the session-scoped profile cache
//!
//! The cache holds one profile per session token. `follow` keeps an entry
//! current through a live document subscription; the entry is dropped (and
//! its subscription stopped) when the session signs out.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use super::{ServiceError, ServiceResult};
use crate::identity::{AuthEvent, Session};
use crate::storage::{collections, subscribe_document, to_fields, DocumentStore};

/// Profile stored at `users/{uid}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// The owner's uid
    #[serde(default)]
    pub id: String,
    pub email: String,
    pub state_code: String,
    pub batch: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lga: Option<String>,
}

/// Editable profile fields. `None` leaves a field as is, an empty string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub lga: Option<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Read a profile, if one exists
    pub async fn find(&self, uid: &str) -> ServiceResult<Option<UserProfile>> {
        match self.store.get(collections::USERS, uid).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, uid: &str) -> ServiceResult<UserProfile> {
        self.find(uid)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("profile for user {}", uid)))
    }

    /// Write a profile (create or replace)
    pub async fn save(&self, uid: &str, profile: &UserProfile) -> ServiceResult<UserProfile> {
        let doc = self
            .store
            .set(collections::USERS, uid, to_fields(profile)?)
            .await?;
        Ok(doc.decode()?)
    }

    /// Apply an update to the stored profile
    pub async fn update(&self, uid: &str, update: ProfileUpdate) -> ServiceResult<UserProfile> {
        let mut profile = self.get(uid).await?;

        if let Some(location) = update.location {
            profile.location = non_empty(location);
        }
        if let Some(lga) = update.lga {
            profile.lga = non_empty(lga);
        }

        let saved = self.save(uid, &profile).await?;
        tracing::info!(uid = %uid, "Profile updated");
        Ok(saved)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

struct CacheEntry {
    uid: String,
    profile: Option<UserProfile>,
    follower: Option<JoinHandle<()>>,
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.abort();
        }
    }
}

/// Profiles cached per session token
pub struct ProfileCache {
    profiles: ProfileService,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl ProfileCache {
    pub fn new(profiles: ProfileService) -> Self {
        Self {
            profiles,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Cached profile for a session
    pub async fn get(&self, token: &str) -> Option<UserProfile> {
        self.entries
            .read()
            .await
            .get(token)
            .and_then(|e| e.profile.clone())
    }

    /// Store a profile for a session.
    ///
    /// A followed entry is owned by its subscription and is left untouched,
    /// so a value read before the latest notification can never replace it.
    pub async fn put(&self, session: &Session, profile: UserProfile) {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&session.token) {
            Some(entry) if entry.uid == session.user.uid => {
                if entry.follower.is_none() {
                    entry.profile = Some(profile);
                }
            }
            _ => {
                entries.insert(
                    session.token.clone(),
                    CacheEntry {
                        uid: session.user.uid.clone(),
                        profile: Some(profile),
                        follower: None,
                    },
                );
            }
        }
    }

    /// Drop a session's entry and stop its subscription
    pub async fn invalidate(&self, token: &str) -> bool {
        self.entries.write().await.remove(token).is_some()
    }

    /// Cached profile, loading it from the store on a miss
    pub async fn get_or_load(&self, session: &Session) -> ServiceResult<UserProfile> {
        if let Some(profile) = self.get(&session.token).await {
            return Ok(profile);
        }

        let profile = self.profiles.get(&session.user.uid).await?;
        self.put(session, profile.clone()).await;
        Ok(profile)
    }

    /// Keep a session's entry in sync with `users/{uid}`.
    ///
    /// Every notification overwrites the cached value. Calling this again for
    /// a session that is already followed does nothing.
    pub async fn follow(&self, session: &Session) {
        let token = session.token.clone();
        let uid = session.user.uid.clone();

        {
            let mut entries = self.entries.write().await;
            let entry = entries.entry(token.clone()).or_insert_with(|| CacheEntry {
                uid: uid.clone(),
                profile: None,
                follower: None,
            });
            if entry.follower.is_some() {
                return;
            }
        }

        let mut subscription =
            subscribe_document(Arc::clone(self.profiles.store()), collections::USERS, &uid);
        let entries = Arc::clone(&self.entries);
        let follow_token = token.clone();

        let handle = tokio::spawn(async move {
            while let Some(doc) = subscription.next().await {
                let profile = match doc.map(|d| d.decode::<UserProfile>()).transpose() {
                    Ok(profile) => profile,
                    Err(e) => {
                        tracing::warn!(uid = %uid, "Undecodable profile: {}", e);
                        continue;
                    }
                };

                match entries.write().await.get_mut(&follow_token) {
                    Some(entry) => entry.profile = profile,
                    None => break,
                }
            }
        });

        let mut entries = self.entries.write().await;
        match entries.get_mut(&token) {
            Some(entry) if entry.follower.is_none() => entry.follower = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Invalidate entries whenever a session signs out
    pub fn watch_sign_outs(
        self: Arc<Self>,
        mut events: broadcast::Receiver<AuthEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedOut { token, uid }) => {
                        if self.invalidate(&token).await {
                            tracing::debug!(uid = %uid, "Dropped cached profile");
                        }
                    }
                    Ok(AuthEvent::SignedIn { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Profile cache missed {} auth events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Number of cached sessions
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityConfig, IdentityService};
    use crate::storage::LocalStore;
    use tokio::time::{sleep, Duration, Instant};

    fn profile(uid: &str, state_code: &str) -> UserProfile {
        UserProfile {
            id: uid.to_string(),
            email: format!("{}@example.com", uid),
            state_code: state_code.to_string(),
            batch: "2024A".to_string(),
            created_at: crate::timestamp_now(),
            location: None,
            lga: None,
        }
    }

    /// Poll the cache until `check` accepts the cached value
    async fn wait_for(
        cache: &ProfileCache,
        token: &str,
        check: impl Fn(Option<UserProfile>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if check(cache.get(token).await) {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn setup() -> (ProfileService, Arc<IdentityService>) {
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::in_memory().await);
        let identity =
            Arc::new(IdentityService::new(Arc::clone(&store), IdentityConfig::default()).unwrap());
        (ProfileService::new(store), identity)
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (profiles, _) = setup().await;
        profiles.save("u1", &profile("u1", "LA/24A/1234")).await.unwrap();

        let updated = profiles
            .update(
                "u1",
                ProfileUpdate {
                    location: Some(" Ikeja ".to_string()),
                    lga: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.location.as_deref(), Some("Ikeja"));
        assert_eq!(updated.state_code, "LA/24A/1234");

        let cleared = profiles
            .update(
                "u1",
                ProfileUpdate {
                    location: Some(String::new()),
                    lga: Some("Ikeja".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(cleared.location.is_none());
        assert_eq!(cleared.lga.as_deref(), Some("Ikeja"));

        assert!(matches!(
            profiles.update("nobody", ProfileUpdate::default()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_follows_latest_notification() {
        let (profiles, identity) = setup().await;
        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();
        let uid = session.user.uid.clone();
        profiles.save(&uid, &profile(&uid, "LA/24A/0001")).await.unwrap();

        let cache = ProfileCache::new(profiles.clone());
        cache.follow(&session).await;
        assert!(
            wait_for(&cache, &session.token, |p| {
                p.map(|p| p.state_code) == Some("LA/24A/0001".to_string())
            })
            .await
        );

        profiles
            .update(
                &uid,
                ProfileUpdate {
                    location: Some("Yaba".to_string()),
                    lga: None,
                },
            )
            .await
            .unwrap();

        assert!(
            wait_for(&cache, &session.token, |p| {
                p.and_then(|p| p.location) == Some("Yaba".to_string())
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_put_does_not_override_followed_entry() {
        let (profiles, identity) = setup().await;
        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();
        let uid = session.user.uid.clone();
        profiles.save(&uid, &profile(&uid, "LA/24A/0001")).await.unwrap();

        let cache = ProfileCache::new(profiles.clone());
        cache.follow(&session).await;
        assert!(wait_for(&cache, &session.token, |p| p.is_some()).await);

        let set_location = |location: &str| ProfileUpdate {
            location: Some(location.to_string()),
            lga: None,
        };
        let first = profiles.update(&uid, set_location("Ikeja")).await.unwrap();
        profiles.update(&uid, set_location("Yaba")).await.unwrap();
        assert!(
            wait_for(&cache, &session.token, |p| {
                p.and_then(|p| p.location) == Some("Yaba".to_string())
            })
            .await
        );

        // A writer finishing late with the older value
        cache.put(&session, first).await;

        let cached = cache.get(&session.token).await.and_then(|p| p.location);
        let stored = profiles.get(&uid).await.unwrap().location;
        assert_eq!(cached, stored);
        assert_eq!(cached.as_deref(), Some("Yaba"));
    }

    #[tokio::test]
    async fn test_get_or_load() {
        let (profiles, identity) = setup().await;
        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();
        let cache = ProfileCache::new(profiles.clone());

        assert!(matches!(
            cache.get_or_load(&session).await,
            Err(ServiceError::NotFound(_))
        ));

        let uid = session.user.uid.clone();
        profiles.save(&uid, &profile(&uid, "KN/24A/0002")).await.unwrap();
        let loaded = cache.get_or_load(&session).await.unwrap();
        assert_eq!(loaded.id, uid);
        assert_eq!(cache.get(&session.token).await, Some(loaded));
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_entry() {
        let (profiles, identity) = setup().await;
        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();
        let uid = session.user.uid.clone();
        profiles.save(&uid, &profile(&uid, "LA/24A/0001")).await.unwrap();

        let cache = Arc::new(ProfileCache::new(profiles));
        let watcher = Arc::clone(&cache).watch_sign_outs(identity.subscribe());

        cache.follow(&session).await;
        assert!(wait_for(&cache, &session.token, |p| p.is_some()).await);

        identity.sign_out(&session.token).await;
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cache.is_empty().await && Instant::now() < deadline {
            sleep(Duration::from_millis(10)).await;
        }
        assert!(cache.is_empty().await);

        watcher.abort();
    }
}
