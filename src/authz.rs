//! Owner-only authorization.

use crate::{
    auth::AuthUser,
    error::ApiError,
    models::{Publish, User, UserId},
};

/// A resource that belongs to exactly one user.
pub trait Owned {
    fn owner_id(&self) -> UserId;
}

/// A user account addressed only by id, e.g. the `{id}` of `PUT /users/{id}`.
/// An account is owned by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account(pub UserId);

impl Owned for Account {
    fn owner_id(&self) -> UserId {
        self.0
    }
}

impl Owned for User {
    fn owner_id(&self) -> UserId {
        self.id
    }
}

impl Owned for Publish {
    fn owner_id(&self) -> UserId {
        self.author_id
    }
}

pub fn owns(resource: &impl Owned, subject: UserId) -> bool {
    resource.owner_id() == subject
}

/// `owns` as a handler guard: `Forbidden` with `message` unless `user` owns `resource`.
pub fn ensure_owner(
    resource: &impl Owned,
    user: &AuthUser,
    message: &'static str,
) -> Result<(), ApiError> {
    if owns(resource, user.id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(message))
    }
}
