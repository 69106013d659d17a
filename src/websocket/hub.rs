//! WebSocket Connection Hub
//!
//! Tracks every connection together with the session it was opened with and
//! the live tasks behind its topics. A topic task is aborted when the client
//! unsubscribes, when the connection goes away, or when its session signs out.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::{ServerMessage, Topic};
use crate::identity::{AuthEvent, Session};
use crate::services::{Services, UserProfile};
use crate::storage::{collections, subscribe_document};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// State of one connection
pub struct ConnectionHandle {
    /// Channel sender for this connection
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    /// Session the connection was opened with
    pub session: Session,
    /// Live task per subscribed topic
    topics: HashMap<Topic, JoinHandle<()>>,
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        for (_, task) in self.topics.drain() {
            task.abort();
        }
    }
}

/// Manages all WebSocket connections and their live topics
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionHandle>>>,
    services: Services,
    config: HubConfig,
}

impl ConnectionHub {
    pub fn new(config: HubConfig, services: Services) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            services,
            config,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached or the session ended before registration.
    pub async fn register(
        &self,
        session: Session,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let token = session.token.clone();
        let id = Uuid::new_v4().to_string();
        {
            let mut connections = self.connections.write().await;
            if connections.len() >= self.config.max_connections {
                return Err(HubError::TooManyConnections(self.config.max_connections));
            }

            tracing::info!(connection_id = %id, uid = %session.user.uid, "WebSocket connected");

            connections.insert(
                id.clone(),
                ConnectionHandle {
                    sender,
                    session,
                    topics: HashMap::new(),
                },
            );
        }

        // A sign-out seen by the watcher before the insert would never reach
        // this connection.
        if self.services.identity.current_session(&token).await.is_none() {
            self.unregister(&id).await;
            return Err(HubError::SessionEnded);
        }
        Ok(id)
    }

    /// Unregister a connection, stopping all of its topics
    pub async fn unregister(&self, id: &str) {
        if self.connections.write().await.remove(id).is_some() {
            tracing::info!(connection_id = %id, "WebSocket disconnected");
        }
    }

    /// Subscribe a connection to topics
    ///
    /// Unknown topics are skipped. Each new topic immediately sends its
    /// current state.
    pub async fn subscribe(&self, id: &str, topics: Vec<String>) -> Result<Vec<String>, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut subscribed = Vec::new();

        for name in topics {
            let topic = match name.parse::<Topic>() {
                Ok(topic) => topic,
                Err(e) => {
                    tracing::warn!(topic = %name, "Invalid topic ignored: {}", e);
                    continue;
                }
            };

            if !handle.topics.contains_key(&topic) {
                let task = self.spawn_topic(topic, &handle.session, handle.sender.clone());
                handle.topics.insert(topic, task);
            }
            subscribed.push(topic.to_string());
        }

        tracing::debug!(
            connection_id = %id,
            topics = ?subscribed,
            "Subscribed to topics"
        );

        Ok(subscribed)
    }

    /// Unsubscribe a connection from topics
    pub async fn unsubscribe(
        &self,
        id: &str,
        topics: Vec<String>,
    ) -> Result<Vec<String>, HubError> {
        let mut connections = self.connections.write().await;
        let handle = connections
            .get_mut(id)
            .ok_or(HubError::ConnectionNotFound)?;

        let mut unsubscribed = Vec::new();
        for name in topics {
            let Ok(topic) = name.parse::<Topic>() else {
                continue;
            };
            if let Some(task) = handle.topics.remove(&topic) {
                task.abort();
                unsubscribed.push(topic.to_string());
            }
        }

        tracing::debug!(
            connection_id = %id,
            topics = ?unsubscribed,
            "Unsubscribed from topics"
        );

        Ok(unsubscribed)
    }

    /// Start the task forwarding a topic to a connection
    fn spawn_topic(
        &self,
        topic: Topic,
        session: &Session,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> JoinHandle<()> {
        let uid = session.user.uid.clone();

        match topic {
            Topic::Reminders => {
                let mut feed = self.services.reminders.watch(&uid);
                tokio::spawn(async move {
                    while let Some(reminders) = feed.next().await {
                        let message = ServerMessage::Reminders {
                            reminders: reminders.to_vec(),
                        };
                        if sender.send(message).is_err() {
                            break;
                        }
                    }
                })
            }
            Topic::Profile => {
                let store = Arc::clone(self.services.profiles.store());
                let mut subscription = subscribe_document(store, collections::USERS, &uid);
                tokio::spawn(async move {
                    while let Some(doc) = subscription.next().await {
                        let profile = match doc.map(|d| d.decode::<UserProfile>()).transpose() {
                            Ok(profile) => profile,
                            Err(e) => {
                                tracing::warn!(uid = %uid, "Undecodable profile: {}", e);
                                continue;
                            }
                        };
                        if sender.send(ServerMessage::Profile { profile }).is_err() {
                            break;
                        }
                    }
                })
            }
        }
    }

    /// Close every connection opened with `token`
    ///
    /// Each one receives `signed_out` before its channel is closed.
    pub async fn close_session(&self, token: &str) -> usize {
        let mut connections = self.connections.write().await;
        let ids: Vec<ConnectionId> = connections
            .iter()
            .filter(|(_, handle)| handle.session.token == token)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            if let Some(handle) = connections.remove(id) {
                let _ = handle.sender.send(ServerMessage::SignedOut);
                tracing::info!(connection_id = %id, "Closing WebSocket after sign-out");
            }
        }
        ids.len()
    }

    /// Close connections whenever their session signs out
    pub fn watch_sign_outs(
        self: Arc<Self>,
        mut events: broadcast::Receiver<AuthEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedOut { token, .. }) => {
                        self.close_session(&token).await;
                    }
                    Ok(AuthEvent::SignedIn { .. }) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("WebSocket hub missed {} auth events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let handle = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        handle
            .sender
            .send(message)
            .map_err(|_| HubError::SendFailed)
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of connections subscribed to a topic
    pub async fn subscription_count(&self, topic: Topic) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|handle| handle.topics.contains_key(&topic))
            .count()
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,

    #[error("Session has ended")]
    SessionEnded,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{IdentityConfig, IdentityService};
    use crate::services::{NewReminder, UserProfile};
    use crate::storage::{DocumentStore, LocalStore};
    use tokio::time::{timeout, Duration};

    async fn setup(max_connections: usize) -> (Arc<ConnectionHub>, Services, Session) {
        let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::in_memory().await);
        let identity =
            Arc::new(IdentityService::new(Arc::clone(&store), IdentityConfig::default()).unwrap());
        let services = Services::new(store, Arc::clone(&identity));
        let session = identity.create_account("ada@example.com", "secret1").await.unwrap();

        let hub = Arc::new(ConnectionHub::new(
            HubConfig { max_connections },
            services.clone(),
        ));
        (hub, services, session)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Option<ServerMessage> {
        timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let (hub, _, session) = setup(10).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = hub.register(session, tx).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(hub.connection_count().await, 1);

        hub.unregister(&id).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (hub, _, session) = setup(2).await;

        let (tx1, _) = mpsc::unbounded_channel();
        let (tx2, _) = mpsc::unbounded_channel();
        let (tx3, _) = mpsc::unbounded_channel();

        hub.register(session.clone(), tx1).await.unwrap();
        hub.register(session.clone(), tx2).await.unwrap();
        let result = hub.register(session, tx3).await;

        assert!(matches!(result, Err(HubError::TooManyConnections(2))));
    }

    #[tokio::test]
    async fn test_register_after_sign_out_is_rejected() {
        let (hub, services, session) = setup(10).await;
        services.identity.sign_out(&session.token).await;

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = hub.register(session, tx).await;

        assert!(matches!(result, Err(HubError::SessionEnded)));
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_reminders_topic_streams_full_list() {
        let (hub, services, session) = setup(10).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register(session.clone(), tx).await.unwrap();

        let subscribed = hub
            .subscribe(&id, vec!["reminders".to_string(), "bogus".to_string()])
            .await
            .unwrap();
        assert_eq!(subscribed, vec!["reminders"]);
        assert_eq!(hub.subscription_count(Topic::Reminders).await, 1);

        match recv(&mut rx).await {
            Some(ServerMessage::Reminders { reminders }) => assert!(reminders.is_empty()),
            other => panic!("Expected reminders, got {:?}", other),
        }

        services
            .reminders
            .add(
                &session.user.uid,
                NewReminder {
                    title: "Monthly clearance".to_string(),
                    date: "2025-02-01T09:00".to_string(),
                    description: String::new(),
                },
            )
            .await
            .unwrap();

        match recv(&mut rx).await {
            Some(ServerMessage::Reminders { reminders }) => {
                assert_eq!(reminders.len(), 1);
                assert_eq!(reminders[0].title, "Monthly clearance");
            }
            other => panic!("Expected reminders, got {:?}", other),
        }

        let unsubscribed = hub.unsubscribe(&id, vec!["reminders".to_string()]).await.unwrap();
        assert_eq!(unsubscribed, vec!["reminders"]);
        assert_eq!(hub.subscription_count(Topic::Reminders).await, 0);
    }

    #[tokio::test]
    async fn test_profile_topic() {
        let (hub, services, session) = setup(10).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register(session.clone(), tx).await.unwrap();

        hub.subscribe(&id, vec!["profile".to_string()]).await.unwrap();
        assert!(matches!(
            recv(&mut rx).await,
            Some(ServerMessage::Profile { profile: None })
        ));

        let uid = session.user.uid.clone();
        let profile = UserProfile {
            id: uid.clone(),
            email: session.user.email.clone(),
            state_code: "LA/24A/1234".to_string(),
            batch: "2024A".to_string(),
            created_at: crate::timestamp_now(),
            location: None,
            lga: None,
        };
        services.profiles.save(&uid, &profile).await.unwrap();

        match recv(&mut rx).await {
            Some(ServerMessage::Profile { profile: Some(p) }) => {
                assert_eq!(p.state_code, "LA/24A/1234")
            }
            other => panic!("Expected profile, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_out_closes_connection() {
        let (hub, services, session) = setup(10).await;
        let watcher = Arc::clone(&hub).watch_sign_outs(services.identity.subscribe());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = hub.register(session.clone(), tx).await.unwrap();
        hub.subscribe(&id, vec!["reminders".to_string()]).await.unwrap();
        assert!(matches!(
            recv(&mut rx).await,
            Some(ServerMessage::Reminders { .. })
        ));

        services.identity.sign_out(&session.token).await;

        assert!(matches!(recv(&mut rx).await, Some(ServerMessage::SignedOut)));
        // Channel closes once the connection and its topic task are gone
        assert!(recv(&mut rx).await.is_none());
        assert_eq!(hub.connection_count().await, 0);

        watcher.abort();
    }
}
