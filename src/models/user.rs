//! Photo owners, as seen by this service.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An owner account. Only the identity pieces this service needs are kept;
/// registration and password handling live elsewhere.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,

    /// Opaque API token presented as `Authorization: Token <token>`.
    #[serde(skip_serializing)]
    pub token: String,
}
