//! WebSocket Live Subscriptions
//!
//! Pushes a user's reminders and profile to connected clients as they change.
//!
//! ## Architecture
//!
//! - **ConnectionHub**: Tracks connections, their sessions and topic tasks
//! - **Handler**: Handles WebSocket upgrade and message processing
//! - **Messages**: Defines client and server message formats
//!
//! ## Usage
//!
//! Clients connect to `/api/v1/ws?token=<session token>` and subscribe to:
//! - `reminders` - The full reminder list, re-sent after every change
//! - `profile` - The user's profile document
//!
//! When the session signs out the client receives `signed_out` and the
//! server closes the socket.
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket(`ws://localhost:8082/api/v1/ws?token=${token}`);
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify({type: 'subscribe', topics: ['reminders']}));
//! };
//!
//! ws.onmessage = (event) => {
//!   const msg = JSON.parse(event.data);
//!   if (msg.type === 'reminders') render(msg.reminders);
//! };
//! ```

mod handler;
mod hub;
mod messages;

pub use handler::websocket_handler;
pub use hub::{ConnectionHub, ConnectionId, HubConfig, HubError};
pub use messages::{ClientMessage, ServerMessage, Topic};
