//! Clearance reminders
//!
//! Reminders belong to one user and are only ever created or deleted. The
//! live list (`ReminderFeed`) replaces its whole contents on every
//! notification; writes never patch it locally.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ServiceError, ServiceResult};
use crate::storage::{
    collections, subscribe_query, to_fields, Direction, Document, DocumentStore, Query,
    QuerySubscription,
};

/// Stored reminder date format
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
    pub user_id: String,
    pub created_at: String,
}

/// Input for a new reminder
#[derive(Debug, Clone, Deserialize)]
pub struct NewReminder {
    pub title: String,
    pub date: String,
    #[serde(default)]
    pub description: String,
}

/// Parse a reminder date and normalise it to `YYYY-MM-DDTHH:MM`
pub fn normalize_date(input: &str) -> ServiceResult<String> {
    let input = input.trim();

    let parsed = NaiveDateTime::parse_from_str(input, DATE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M"))
        .or_else(|_| DateTime::parse_from_rfc3339(input).map(|dt| dt.naive_utc()))
        .or_else(|_| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .map_err(|_| ServiceError::Validation(format!("Invalid reminder date: '{}'", input)))?;

    Ok(parsed.format(DATE_FORMAT).to_string())
}

fn owner_query(uid: &str) -> Query {
    Query::collection(collections::REMINDERS)
        .where_eq("userId", uid)
        .order_by("date", Direction::Asc)
}

fn decode_all(docs: &[Document]) -> Vec<Reminder> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(reminder) => Some(reminder),
            Err(e) => {
                tracing::warn!(id = %doc.id, "Skipping undecodable reminder: {}", e);
                None
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn DocumentStore>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, uid: &str, input: NewReminder) -> ServiceResult<Reminder> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ServiceError::Validation(
                "Reminder title is required".to_string(),
            ));
        }

        let reminder = Reminder {
            id: String::new(),
            title: title.to_string(),
            date: normalize_date(&input.date)?,
            description: input.description.trim().to_string(),
            user_id: uid.to_string(),
            created_at: crate::timestamp_now(),
        };

        let doc = self
            .store
            .add(collections::REMINDERS, to_fields(&reminder)?)
            .await?;
        tracing::info!(uid = %uid, reminder_id = %doc.id, "Reminder added");

        Ok(doc.decode()?)
    }

    /// Delete one of `uid`'s reminders
    pub async fn delete(&self, uid: &str, id: &str) -> ServiceResult<()> {
        let doc = self
            .store
            .get(collections::REMINDERS, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("reminder {}", id)))?;

        if doc.get_str("userId") != Some(uid) {
            return Err(ServiceError::Forbidden(format!(
                "reminder {} belongs to another user",
                id
            )));
        }

        self.store.delete(collections::REMINDERS, id).await?;
        tracing::info!(uid = %uid, reminder_id = %id, "Reminder deleted");
        Ok(())
    }

    /// One-shot fetch of `uid`'s reminders, earliest first
    pub async fn list(&self, uid: &str) -> ServiceResult<Vec<Reminder>> {
        let docs = self.store.query(&owner_query(uid)).await?;
        Ok(decode_all(&docs))
    }

    /// Live list of `uid`'s reminders
    pub fn watch(&self, uid: &str) -> ReminderFeed {
        ReminderFeed {
            subscription: subscribe_query(Arc::clone(&self.store), owner_query(uid)),
            current: Vec::new(),
        }
    }
}

/// A live reminder list. Dropping it stops the subscription.
pub struct ReminderFeed {
    subscription: QuerySubscription,
    current: Vec<Reminder>,
}

impl ReminderFeed {
    /// Wait for the next notification and replace the list with it
    pub async fn next(&mut self) -> Option<&[Reminder]> {
        let docs = self.subscription.next().await?;
        self.current = decode_all(&docs);
        Some(&self.current)
    }

    /// The list as of the last notification
    pub fn current(&self) -> &[Reminder] {
        &self.current
    }

    pub fn unsubscribe(self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use tokio::time::{timeout, Duration};

    fn new_reminder(title: &str, date: &str) -> NewReminder {
        NewReminder {
            title: title.to_string(),
            date: date.to_string(),
            description: String::new(),
        }
    }

    async fn service() -> ReminderService {
        ReminderService::new(Arc::new(LocalStore::in_memory().await))
    }

    async fn next_list(feed: &mut ReminderFeed) -> Vec<String> {
        timeout(Duration::from_secs(2), feed.next())
            .await
            .unwrap()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect()
    }

    #[test]
    fn test_normalize_date() {
        assert_eq!(normalize_date("2025-03-01T09:30").unwrap(), "2025-03-01T09:30");
        assert_eq!(normalize_date("2025-03-01T09:30:59").unwrap(), "2025-03-01T09:30");
        assert_eq!(normalize_date("2025-03-01 09:30").unwrap(), "2025-03-01T09:30");
        assert_eq!(normalize_date("2025-03-01").unwrap(), "2025-03-01T00:00");
        assert_eq!(
            normalize_date("2025-03-01T10:30:00+01:00").unwrap(),
            "2025-03-01T09:30"
        );
        assert!(matches!(
            normalize_date("next monday"),
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_add_and_list_sorted_by_date() {
        let reminders = service().await;
        reminders.add("u1", new_reminder("Final clearance", "2025-06-01T09:00")).await.unwrap();
        reminders.add("u1", new_reminder("Monthly clearance", "2025-02-01T09:00")).await.unwrap();
        reminders.add("u2", new_reminder("Not mine", "2025-01-01T09:00")).await.unwrap();

        let list = reminders.list("u1").await.unwrap();
        let titles: Vec<&str> = list.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Monthly clearance", "Final clearance"]);
        assert!(list.iter().all(|r| r.user_id == "u1"));
    }

    #[tokio::test]
    async fn test_title_required() {
        let reminders = service().await;
        assert!(matches!(
            reminders.add("u1", new_reminder("  ", "2025-06-01T09:00")).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(reminders.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_checks_owner() {
        let reminders = service().await;
        let reminder = reminders.add("u1", new_reminder("CDS", "2025-06-01T09:00")).await.unwrap();

        assert!(matches!(
            reminders.delete("u2", &reminder.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            reminders.delete("u1", "missing").await,
            Err(ServiceError::NotFound(_))
        ));

        reminders.delete("u1", &reminder.id).await.unwrap();
        assert!(reminders.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_live_list_removes_exactly_the_deleted_reminder() {
        let reminders = service().await;
        let mut feed = reminders.watch("u1");
        assert!(next_list(&mut feed).await.is_empty());

        let first = reminders.add("u1", new_reminder("A", "2025-01-01T09:00")).await.unwrap();
        assert_eq!(next_list(&mut feed).await, vec!["A"]);

        reminders.add("u1", new_reminder("B", "2025-02-01T09:00")).await.unwrap();
        assert_eq!(next_list(&mut feed).await, vec!["A", "B"]);

        reminders.add("u1", new_reminder("C", "2025-03-01T09:00")).await.unwrap();
        assert_eq!(next_list(&mut feed).await, vec!["A", "B", "C"]);

        reminders.delete("u1", &first.id).await.unwrap();
        assert_eq!(next_list(&mut feed).await, vec!["B", "C"]);
        assert_eq!(feed.current().len(), 2);

        feed.unsubscribe();
    }
}
