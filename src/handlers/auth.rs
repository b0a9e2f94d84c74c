//! Token authentication extractor.
//!
//! Clients send `Authorization: Token <key>`; the key is resolved to an
//! owner through `UserService`. Any handler taking `AuthUser` is therefore
//! closed to anonymous callers.

use crate::{errors::AppError, models::user::User, state::AppState};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

const TOKEN_SCHEME: &str = "Token";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided."))?;

        let token = parse_token(value)
            .ok_or_else(|| AppError::unauthorized("Invalid token header."))?;

        let user = state
            .users
            .find_by_token(token)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid token."))?;

        Ok(AuthUser(user))
    }
}

fn parse_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(TOKEN_SCHEME) && !token.is_empty() && !token.contains(' '))
        .then_some(token)
}
