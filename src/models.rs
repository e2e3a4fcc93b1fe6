use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use validator::ValidateEmail;

use crate::{error::ApiError, password::PasswordHasher};

/// Numeric identity shared by users and (as author) publishes. Maps to Postgres BIGSERIAL.
pub type UserId = i64;

// --- Records (mapped to database rows) ---

/// User
///
/// A registered account as returned to clients. The password hash is not a field here,
/// so it cannot be serialized back by accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub nick: String,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Publish
///
/// A short text post. `author_nick` is not stored on the row; it is joined from `users`
/// at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Publish {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: UserId,
    pub author_nick: String,
    pub likes: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Credentials
///
/// Internal row used by login: the id and stored hash for an email. Never serialized.
#[derive(Clone, FromRow)]
pub struct Credentials {
    pub id: UserId,
    pub password: String,
}

// --- Request payloads ---

/// Which endpoint a `UserPayload` arrived on. Registration requires and hashes a password,
/// profile updates ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register,
    Update,
}

/// UserPayload
///
/// Body of `POST /users` and `PUT /users/{id}`. After `prepare(Stage::Register, ..)` the
/// `password` field holds the hash, not the submitted plaintext.
#[derive(Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UserPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

impl std::fmt::Debug for UserPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPayload")
            .field("name", &self.name)
            .field("nick", &self.nick)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl UserPayload {
    /// Trims, validates and, on registration, replaces the password with its hash.
    ///
    /// Validation runs before hashing so an empty password is always caught.
    pub fn prepare(&mut self, stage: Stage, hasher: &PasswordHasher) -> Result<(), ApiError> {
        self.name = self.name.trim().to_string();
        self.nick = self.nick.trim().to_string();
        self.email = self.email.trim().to_string();

        self.validate(stage)?;

        if stage == Stage::Register {
            self.password = hasher.hash(&self.password)?;
        }
        Ok(())
    }

    fn validate(&self, stage: Stage) -> Result<(), ApiError> {
        if self.name.is_empty() {
            return Err(ApiError::Validation("name is required".into()));
        }
        if self.nick.is_empty() {
            return Err(ApiError::Validation("nick is required".into()));
        }
        if self.email.is_empty() {
            return Err(ApiError::Validation("email is required".into()));
        }
        if !self.email.validate_email() {
            return Err(ApiError::Validation("email is invalid".into()));
        }
        if stage == Stage::Register && self.password.is_empty() {
            return Err(ApiError::Validation("password is required".into()));
        }
        Ok(())
    }
}

/// PublishPayload
///
/// Body of `POST /publishes` and `PUT /publishes/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PublishPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl PublishPayload {
    pub fn prepare(&mut self) -> Result<(), ApiError> {
        self.title = self.title.trim().to_string();
        self.content = self.content.trim().to_string();

        if self.title.is_empty() {
            return Err(ApiError::Validation("title is required".into()));
        }
        if self.content.is_empty() {
            return Err(ApiError::Validation("content is required".into()));
        }
        Ok(())
    }
}

/// LoginRequest
///
/// Body of `POST /login`.
#[derive(Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// PasswordChange
///
/// Body of `POST /users/{id}/update-password`.
#[derive(Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct PasswordChange {
    #[serde(default)]
    pub current: String,
    #[serde(default)]
    pub new: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.new.is_empty() {
            return Err(ApiError::Validation("new password is required".into()));
        }
        Ok(())
    }
}

/// UserSearch
///
/// Query string of `GET /users`. A missing `user` matches everyone.
#[derive(Debug, Clone, Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct UserSearch {
    /// Case-insensitive substring of the name or nick.
    pub user: Option<String>,
}
