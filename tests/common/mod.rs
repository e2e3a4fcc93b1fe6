#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::error::{DatabaseError, ErrorKind};
use social_feed::{
    AppConfig, AppState, create_router,
    models::{Credentials, Publish, PublishPayload, User, UserId, UserPayload},
    repository::{RepoResult, Repository, RepositoryState},
};
use std::{
    collections::BTreeSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::net::TcpListener;

pub const TEST_SECRET: &str = "test-secret-value-1234567890";

/// The constraint errors Postgres raises for the schema in `migrations/`.
#[derive(Debug, thiserror::Error)]
enum ConstraintViolation {
    #[error("duplicate key value violates unique constraint")]
    Unique,
    #[error("insert or update violates foreign key constraint")]
    ForeignKey,
}

impl DatabaseError for ConstraintViolation {
    fn message(&self) -> &str {
        match self {
            ConstraintViolation::Unique => "duplicate key value violates unique constraint",
            ConstraintViolation::ForeignKey => "insert or update violates foreign key constraint",
        }
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ConstraintViolation::Unique => ErrorKind::UniqueViolation,
            ConstraintViolation::ForeignKey => ErrorKind::ForeignKeyViolation,
        }
    }
}

fn violation(kind: ConstraintViolation) -> sqlx::Error {
    sqlx::Error::Database(Box::new(kind))
}

#[derive(Default)]
struct Inner {
    users: Vec<(User, String)>,
    // (user_id, follower_id)
    followers: BTreeSet<(UserId, UserId)>,
    publishes: Vec<Publish>,
    next_user_id: i64,
    next_publish_id: i64,
}

/// In-process `Repository` with the same observable semantics as the Postgres one.
/// Setting `fail` makes every call return a store error.
#[derive(Default)]
pub struct InMemoryRepository {
    inner: Mutex<Inner>,
    pub fail: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let repo = Self::default();
        repo.fail.store(true, Ordering::SeqCst);
        repo
    }

    fn check(&self) -> RepoResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }

    /// The stored hash for `id`, for assertions.
    pub fn stored_password(&self, id: UserId) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .users
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(_, p)| p.clone())
    }

    /// Seeds a publish with an explicit age so feed ordering can be asserted.
    pub fn seed_publish(&self, author_id: UserId, title: &str, age_minutes: i64) -> Publish {
        let mut inner = self.inner.lock().unwrap();
        inner.next_publish_id += 1;
        let author_nick = nick_of(&inner, author_id);
        let publish = Publish {
            id: inner.next_publish_id,
            title: title.to_string(),
            content: format!("{title} content"),
            author_id,
            author_nick,
            likes: 0,
            created_at: Utc::now() - Duration::minutes(age_minutes),
        };
        inner.publishes.push(publish.clone());
        publish
    }
}

fn user_exists(inner: &Inner, id: UserId) -> bool {
    inner.users.iter().any(|(u, _)| u.id == id)
}

/// Whether a user other than `except` already holds `nick` or `email`.
fn identity_taken(inner: &Inner, nick: &str, email: &str, except: Option<UserId>) -> bool {
    inner
        .users
        .iter()
        .any(|(u, _)| Some(u.id) != except && (u.nick == nick || u.email == email))
}

fn nick_of(inner: &Inner, id: UserId) -> String {
    inner
        .users
        .iter()
        .find(|(u, _)| u.id == id)
        .map(|(u, _)| u.nick.clone())
        .unwrap_or_default()
}

fn newest_first(publishes: &mut [Publish]) {
    publishes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: &UserPayload) -> RepoResult<User> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if identity_taken(&inner, &user.nick, &user.email, None) {
            return Err(violation(ConstraintViolation::Unique));
        }
        inner.next_user_id += 1;
        let created = User {
            id: inner.next_user_id,
            name: user.name.clone(),
            nick: user.nick.clone(),
            email: user.email.clone(),
            created_at: Utc::now(),
        };
        inner.users.push((created.clone(), user.password.clone()));
        Ok(created)
    }

    async fn search_users(&self, name_or_nick: &str) -> RepoResult<Vec<User>> {
        self.check()?;
        let needle = name_or_nick.to_lowercase();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .map(|(u, _)| u)
            .filter(|u| {
                u.name.to_lowercase().contains(&needle) || u.nick.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|(u, _)| u.id == id).map(|(u, _)| u.clone()))
    }

    async fn update_user(&self, id: UserId, user: &UserPayload) -> RepoResult<Option<User>> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if !user_exists(&inner, id) {
            return Ok(None);
        }
        if identity_taken(&inner, &user.nick, &user.email, Some(id)) {
            return Err(violation(ConstraintViolation::Unique));
        }
        let Some((stored, _)) = inner.users.iter_mut().find(|(u, _)| u.id == id) else {
            return Ok(None);
        };
        stored.name = user.name.clone();
        stored.nick = user.nick.clone();
        stored.email = user.email.clone();
        let updated = stored.clone();
        for publish in inner.publishes.iter_mut().filter(|p| p.author_id == id) {
            publish.author_nick = updated.nick.clone();
        }
        Ok(Some(updated))
    }

    async fn delete_user(&self, id: UserId) -> RepoResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.users.len();
        inner.users.retain(|(u, _)| u.id != id);
        let removed = inner.users.len() < before;
        if removed {
            inner.publishes.retain(|p| p.author_id != id);
            inner.followers.retain(|(u, f)| *u != id && *f != id);
        }
        Ok(removed)
    }

    async fn get_credentials(&self, email: &str) -> RepoResult<Option<Credentials>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|(u, _)| u.email == email)
            .map(|(u, p)| Credentials {
                id: u.id,
                password: p.clone(),
            }))
    }

    async fn get_password_hash(&self, id: UserId) -> RepoResult<Option<String>> {
        self.check()?;
        Ok(self.stored_password(id))
    }

    async fn set_password_hash(&self, id: UserId, hash: &str) -> RepoResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.users.iter_mut().find(|(u, _)| u.id == id) {
            Some((_, password)) => {
                *password = hash.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn follow(&self, user_id: UserId, follower_id: UserId) -> RepoResult<()> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if !user_exists(&inner, user_id) || !user_exists(&inner, follower_id) {
            return Err(violation(ConstraintViolation::ForeignKey));
        }
        inner.followers.insert((user_id, follower_id));
        Ok(())
    }

    async fn unfollow(&self, user_id: UserId, follower_id: UserId) -> RepoResult<()> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .followers
            .remove(&(user_id, follower_id));
        Ok(())
    }

    async fn get_followers(&self, user_id: UserId) -> RepoResult<Vec<User>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|(u, _)| inner.followers.contains(&(user_id, u.id)))
            .map(|(u, _)| u.clone())
            .collect())
    }

    async fn get_following(&self, user_id: UserId) -> RepoResult<Vec<User>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .filter(|(u, _)| inner.followers.contains(&(u.id, user_id)))
            .map(|(u, _)| u.clone())
            .collect())
    }

    async fn create_publish(
        &self,
        author_id: UserId,
        publish: &PublishPayload,
    ) -> RepoResult<Publish> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if !user_exists(&inner, author_id) {
            return Err(violation(ConstraintViolation::ForeignKey));
        }
        inner.next_publish_id += 1;
        let created = Publish {
            id: inner.next_publish_id,
            title: publish.title.clone(),
            content: publish.content.clone(),
            author_id,
            author_nick: nick_of(&inner, author_id),
            likes: 0,
            created_at: Utc::now(),
        };
        inner.publishes.push(created.clone());
        Ok(created)
    }

    async fn get_publish(&self, id: i64) -> RepoResult<Option<Publish>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.publishes.iter().find(|p| p.id == id).cloned())
    }

    async fn get_feed(&self, user_id: UserId) -> RepoResult<Vec<Publish>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut feed: Vec<Publish> = inner
            .publishes
            .iter()
            .filter(|p| {
                p.author_id == user_id || inner.followers.contains(&(p.author_id, user_id))
            })
            .cloned()
            .collect();
        newest_first(&mut feed);
        Ok(feed)
    }

    async fn get_publishes_by_user(&self, user_id: UserId) -> RepoResult<Vec<Publish>> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut publishes: Vec<Publish> = inner
            .publishes
            .iter()
            .filter(|p| p.author_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut publishes);
        Ok(publishes)
    }

    async fn update_publish(&self, id: i64, publish: &PublishPayload) -> RepoResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.publishes.iter_mut().find(|p| p.id == id) {
            Some(stored) => {
                stored.title = publish.title.clone();
                stored.content = publish.content.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_publish(&self, id: i64) -> RepoResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let before = inner.publishes.len();
        inner.publishes.retain(|p| p.id != id);
        Ok(inner.publishes.len() < before)
    }

    async fn like_publish(&self, id: i64) -> RepoResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.publishes.iter_mut().find(|p| p.id == id) {
            Some(stored) => {
                stored.likes += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn unlike_publish(&self, id: i64) -> RepoResult<bool> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.publishes.iter_mut().find(|p| p.id == id) {
            Some(stored) => {
                stored.likes = (stored.likes - 1).max(0);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_SECRET.to_string(),
        ..AppConfig::default()
    }
}

pub fn test_state(repo: Arc<InMemoryRepository>) -> AppState {
    AppState::new(repo as RepositoryState, test_config())
}

#[derive(Debug)]
pub struct TestApp {
    pub address: String,
}

/// Serves the real router over loopback, backed by `repo`.
pub async fn spawn_app(repo: Arc<InMemoryRepository>) -> TestApp {
    let router = create_router(test_state(repo));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}
