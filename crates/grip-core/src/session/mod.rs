//! Durable conversation sessions: one JSON file per `<channel>:<id>`
//! key, an in-memory LRU cache, and per-key write serialization.

pub mod manager;

pub use manager::{Session, SessionManager};
