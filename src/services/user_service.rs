//! Owner lookups backing token authentication and notification recipients.

use crate::models::user::User;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type UserResult<T> = Result<T, UserError>;

#[derive(Clone)]
pub struct UserService {
    db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create an owner with a freshly minted API token.
    pub async fn create(&self, username: &str, email: &str) -> UserResult<User> {
        let token = Uuid::new_v4().simple().to_string();

        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, token) VALUES (?, ?, ?)
             RETURNING id, username, email, token",
        )
        .bind(username)
        .bind(email)
        .bind(&token)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                UserError::UsernameTaken(username.to_string())
            }
            other => UserError::Sqlx(other),
        })
    }

    /// Resolve an API token to its owner.
    pub async fn find_by_token(&self, token: &str) -> UserResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, token FROM users WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&*self.db)
        .await?;
        Ok(user)
    }

    /// Distinct, non-empty email addresses of the given owners, sorted.
    pub async fn emails_for(&self, owner_ids: &[i64]) -> UserResult<Vec<String>> {
        if owner_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT DISTINCT email FROM users WHERE email <> '' AND id IN (");
        let mut separated = builder.separated(", ");
        for id in owner_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY email");

        let emails = builder
            .build_query_scalar::<String>()
            .fetch_all(&*self.db)
            .await?;
        Ok(emails)
    }
}
