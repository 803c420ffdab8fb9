//! Persistence layer
//!
//! All persistent state lives behind [`Store`], a SQLite database accessed
//! through sqlx. The store is injected into every component that needs it.

mod files;
mod history;
mod store;

pub use store::{Store, ACTIVE_SESSION_KEY, SCHEMA_VERSION, SCHEMA_VERSION_KEY};
