//! Caller identity.
//!
//! Tokens are verified upstream; the gateway forwards the authenticated user
//! id in [`USER_ID_HEADER`]. The id must name an existing user.

use axum::http::HeaderMap;

use crate::commands::users;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::User;

pub const USER_ID_HEADER: &str = "x-user-id";

/// `Ok(None)` when the header is absent; a present but unusable header is
/// still an error.
pub fn optional_user(db: &Database, headers: &HeaderMap) -> Result<Option<User>> {
    let Some(raw) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let id: i64 = raw
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or(AppError::Unauthorized)?;

    match users::get_user(db, id) {
        Ok(user) => Ok(Some(user)),
        Err(AppError::NotFound(_)) => Err(AppError::Unauthorized),
        Err(e) => Err(e),
    }
}

pub fn current_user(db: &Database, headers: &HeaderMap) -> Result<User> {
    optional_user(db, headers)?.ok_or(AppError::Unauthorized)
}

pub fn require_admin(db: &Database, headers: &HeaderMap) -> Result<User> {
    let user = current_user(db, headers)?;
    if user.is_admin() {
        Ok(user)
    } else {
        Err(AppError::Forbidden)
    }
}
