//! API Routes
//!
//! Route handlers organized by functionality.

pub mod auth;
pub mod health;
pub mod posts;
pub mod ppas;
pub mod profile;
pub mod reminders;
pub mod resources;
