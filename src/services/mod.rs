//! Feature services
//!
//! One service per page of the app. Each issues direct reads and writes
//! against the document store and the identity service; none of them retry
//! or cache anything beyond the session-scoped profile cache.

pub mod directory;
pub mod feed;
pub mod profile;
pub mod reminders;
pub mod resources;
pub mod signup;

pub use directory::{DirectorySearch, DirectoryService, Ppa, STATES};
pub use feed::{FeedService, Post};
pub use profile::{ProfileCache, ProfileService, ProfileUpdate, UserProfile};
pub use reminders::{NewReminder, Reminder, ReminderFeed, ReminderService};
pub use resources::{Download, Resource, ResourceKind};
pub use signup::{SignupForm, SignupOutcome, SignupService};

use std::sync::Arc;
use thiserror::Error;

use crate::identity::{IdentityError, IdentityService};
use crate::storage::{DocumentStore, StorageError};

/// Errors returned by the feature services
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Input rejected before anything was written
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The record belongs to another user
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Every service wired to one store and identity service
#[derive(Clone)]
pub struct Services {
    pub identity: Arc<IdentityService>,
    pub signup: SignupService,
    pub profiles: ProfileService,
    pub profile_cache: Arc<ProfileCache>,
    pub feed: FeedService,
    pub reminders: ReminderService,
    pub directory: DirectoryService,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<IdentityService>) -> Self {
        let profiles = ProfileService::new(Arc::clone(&store));

        Self {
            signup: SignupService::new(Arc::clone(&identity), profiles.clone()),
            profile_cache: Arc::new(ProfileCache::new(profiles.clone())),
            profiles,
            feed: FeedService::new(Arc::clone(&store)),
            reminders: ReminderService::new(Arc::clone(&store)),
            directory: DirectoryService::new(store),
            identity,
        }
    }

    /// Start background tasks tied to the identity service.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.profile_cache).watch_sign_outs(self.identity.subscribe())
    }
}
