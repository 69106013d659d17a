//! Community feed
//!
//! Posts carry a copy of the author's profile fields taken when the post is
//! written. Later profile changes do not rewrite existing posts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::profile::UserProfile;
use super::{ServiceError, ServiceResult};
use crate::identity::AuthUser;
use crate::storage::{collections, to_fields, Direction, DocumentStore, Query};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub user_email: String,
    pub user_state_code: String,
    pub user_batch: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn DocumentStore>,
}

impl FeedService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// All posts, newest first
    pub async fn list(&self) -> ServiceResult<Vec<Post>> {
        let query = Query::collection(collections::POSTS).order_by("createdAt", Direction::Desc);

        let docs = self.store.query(&query).await?;
        let mut posts = Vec::with_capacity(docs.len());
        for doc in &docs {
            posts.push(doc.decode()?);
        }
        Ok(posts)
    }

    /// Write a post as `user`, then return the refreshed feed
    pub async fn create(
        &self,
        user: &AuthUser,
        profile: &UserProfile,
        content: &str,
    ) -> ServiceResult<Vec<Post>> {
        if content.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Post content cannot be empty".to_string(),
            ));
        }

        let post = Post {
            id: String::new(),
            content: content.to_string(),
            user_id: user.uid.clone(),
            user_email: user.email.clone(),
            user_state_code: profile.state_code.clone(),
            user_batch: profile.batch.clone(),
            created_at: crate::timestamp_now(),
        };

        let doc = self.store.add(collections::POSTS, to_fields(&post)?).await?;
        tracing::info!(uid = %user.uid, post_id = %doc.id, "Post shared");

        self.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;

    fn author(uid: &str) -> (AuthUser, UserProfile) {
        let user = AuthUser {
            uid: uid.to_string(),
            email: format!("{}@example.com", uid),
        };
        let profile = UserProfile {
            id: uid.to_string(),
            email: user.email.clone(),
            state_code: "OY/24B/0420".to_string(),
            batch: "2024B".to_string(),
            created_at: crate::timestamp_now(),
            location: None,
            lga: None,
        };
        (user, profile)
    }

    async fn feed() -> FeedService {
        FeedService::new(Arc::new(LocalStore::in_memory().await))
    }

    #[tokio::test]
    async fn test_create_appends_one_tagged_post() {
        let feed = feed().await;
        let (user, profile) = author("u1");

        let before = feed.list().await.unwrap();
        assert!(before.is_empty());

        let after = feed.create(&user, &profile, "First day at camp").await.unwrap();
        assert_eq!(after.len(), 1);

        let post = &after[0];
        assert!(!post.id.is_empty());
        assert_eq!(post.content, "First day at camp");
        assert_eq!(post.user_id, "u1");
        assert_eq!(post.user_email, "u1@example.com");
        assert_eq!(post.user_state_code, "OY/24B/0420");
        assert_eq!(post.user_batch, "2024B");
    }

    #[tokio::test]
    async fn test_feed_is_newest_first() {
        let feed = feed().await;
        let (user, profile) = author("u1");

        feed.create(&user, &profile, "one").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        feed.create(&user, &profile, "two").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let posts = feed.create(&user, &profile, "three").await.unwrap();

        let contents: Vec<&str> = posts.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn test_posts_keep_author_snapshot() {
        let feed = feed().await;
        let (user, mut profile) = author("u1");

        feed.create(&user, &profile, "before").await.unwrap();
        profile.state_code = "LA/24B/9999".to_string();
        let posts = feed.create(&user, &profile, "after").await.unwrap();

        let before = posts.iter().find(|p| p.content == "before").unwrap();
        let after = posts.iter().find(|p| p.content == "after").unwrap();
        assert_eq!(before.user_state_code, "OY/24B/0420");
        assert_eq!(after.user_state_code, "LA/24B/9999");
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let feed = feed().await;
        let (user, profile) = author("u1");

        assert!(matches!(
            feed.create(&user, &profile, "   ").await,
            Err(ServiceError::Validation(_))
        ));
        assert!(feed.list().await.unwrap().is_empty());
    }
}
