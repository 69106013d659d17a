//! WebSocket Message Types
//!
//! Defines all message types for WebSocket communication between
//! clients and the Corpsnet server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::services::{Reminder, UserProfile};

/// Live topics a connection can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// The signed-in user's reminder list
    Reminders,
    /// The signed-in user's profile
    Profile,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Reminders => "reminders",
            Topic::Profile => "profile",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reminders" => Ok(Topic::Reminders),
            "profile" => Ok(Topic::Profile),
            other => Err(format!("Unknown topic: {}", other)),
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to topics for live updates
    Subscribe {
        /// Topics to subscribe to ("reminders", "profile")
        topics: Vec<String>,
    },
    /// Unsubscribe from topics
    Unsubscribe { topics: Vec<String> },
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected {
        connection_id: String,
        uid: String,
    },
    /// Subscription confirmed
    Subscribed { topics: Vec<String> },
    /// Unsubscription confirmed
    Unsubscribed { topics: Vec<String> },
    /// Full reminder list, sent on subscribe and after every change
    Reminders { reminders: Vec<Reminder> },
    /// Current profile (`null` while none exists)
    Profile { profile: Option<UserProfile> },
    /// The session ended; the server closes the connection next
    SignedOut,
    /// Pong response to ping
    Pong,
    /// Error message
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialize_subscribe() {
        let json = r#"{"type": "subscribe", "topics": ["reminders", "profile"]}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe { topics } => {
                assert_eq!(topics, vec!["reminders", "profile"]);
            }
            _ => panic!("Expected Subscribe"),
        }
    }

    #[test]
    fn test_client_message_deserialize_ping() {
        let json = r#"{"type": "ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_server_message_serialize() {
        let json = serde_json::to_string(&ServerMessage::Reminders { reminders: vec![] }).unwrap();
        assert_eq!(json, r#"{"type":"reminders","reminders":[]}"#);

        let json = serde_json::to_string(&ServerMessage::SignedOut).unwrap();
        assert_eq!(json, r#"{"type":"signed_out"}"#);

        let json = serde_json::to_string(&ServerMessage::Profile { profile: None }).unwrap();
        assert_eq!(json, r#"{"type":"profile","profile":null}"#);
    }

    #[test]
    fn test_topic_parsing() {
        assert_eq!("reminders".parse::<Topic>().unwrap(), Topic::Reminders);
        assert_eq!(Topic::Profile.to_string(), "profile");
        assert!("posts".parse::<Topic>().is_err());
    }
}
