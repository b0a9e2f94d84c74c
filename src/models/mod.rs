//! Core data models for the photo album service.
//!
//! These map cleanly to database tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod download_link;
pub mod photo;
pub mod user;
