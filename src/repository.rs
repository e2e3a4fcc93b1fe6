use crate::models::{Credentials, Publish, PublishPayload, User, UserId, UserPayload};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Repository Trait
///
/// The persistence contract handlers are written against. Every operation is a single
/// statement. Absence is explicit: lookups return `Option`, mutations report whether a
/// row was affected. Store failures are returned as-is, never retried.
///
/// `Send + Sync + async_trait` make `Arc<dyn Repository>` usable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    /// Inserts a user. `user.password` must already be a hash.
    async fn create_user(&self, user: &UserPayload) -> RepoResult<User>;
    /// Case-insensitive substring match on name or nick.
    async fn search_users(&self, name_or_nick: &str) -> RepoResult<Vec<User>>;
    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    /// Updates name, nick and email. The password is left untouched.
    async fn update_user(&self, id: UserId, user: &UserPayload) -> RepoResult<Option<User>>;
    async fn delete_user(&self, id: UserId) -> RepoResult<bool>;
    async fn get_credentials(&self, email: &str) -> RepoResult<Option<Credentials>>;
    async fn get_password_hash(&self, id: UserId) -> RepoResult<Option<String>>;
    async fn set_password_hash(&self, id: UserId, hash: &str) -> RepoResult<bool>;

    // --- Social graph ---
    /// Records that `follower_id` follows `user_id`. Idempotent.
    async fn follow(&self, user_id: UserId, follower_id: UserId) -> RepoResult<()>;
    async fn unfollow(&self, user_id: UserId, follower_id: UserId) -> RepoResult<()>;
    /// Users following `user_id`.
    async fn get_followers(&self, user_id: UserId) -> RepoResult<Vec<User>>;
    /// Users `user_id` follows.
    async fn get_following(&self, user_id: UserId) -> RepoResult<Vec<User>>;

    // --- Publishes ---
    async fn create_publish(&self, author_id: UserId, publish: &PublishPayload)
    -> RepoResult<Publish>;
    async fn get_publish(&self, id: i64) -> RepoResult<Option<Publish>>;
    /// Publishes by `user_id` and everyone they follow, newest first, without duplicates.
    async fn get_feed(&self, user_id: UserId) -> RepoResult<Vec<Publish>>;
    async fn get_publishes_by_user(&self, user_id: UserId) -> RepoResult<Vec<Publish>>;
    async fn update_publish(&self, id: i64, publish: &PublishPayload) -> RepoResult<bool>;
    async fn delete_publish(&self, id: i64) -> RepoResult<bool>;
    async fn like_publish(&self, id: i64) -> RepoResult<bool>;
    /// Decrements the like counter, never below zero.
    async fn unlike_publish(&self, id: i64) -> RepoResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Columns of `User`, in struct order.
const USER_COLUMNS: &str = "id, name, nick, email, created_at";

/// Select list for `Publish`; `p` is `publishes`, `u` is the author in `users`.
const PUBLISH_COLUMNS: &str =
    "p.id, p.title, p.content, p.author_id, u.nick AS author_nick, p.likes, p.created_at";

/// PostgresRepository
///
/// `Repository` backed by a Postgres pool. Each call checks a connection out of the pool
/// for the duration of one statement and returns it when done.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: &UserPayload) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, nick, email, password) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.nick)
        .bind(&user.email)
        .bind(&user.password)
        .fetch_one(&self.pool)
        .await
    }

    async fn search_users(&self, name_or_nick: &str) -> RepoResult<Vec<User>> {
        let pattern = format!("%{}%", escape_like(name_or_nick));

        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE name ILIKE $1 OR nick ILIKE $1 ORDER BY id"
        ))
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_user(&self, id: UserId, user: &UserPayload) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $2, nick = $3, email = $4 WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&user.name)
        .bind(&user.nick)
        .bind(&user.email)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_user(&self, id: UserId) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_credentials(&self, email: &str) -> RepoResult<Option<Credentials>> {
        sqlx::query_as::<_, Credentials>("SELECT id, password FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_password_hash(&self, id: UserId) -> RepoResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT password FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set_password_hash(&self, id: UserId, hash: &str) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn follow(&self, user_id: UserId, follower_id: UserId) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO followers (user_id, follower_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(follower_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unfollow(&self, user_id: UserId, follower_id: UserId) -> RepoResult<()> {
        sqlx::query("DELETE FROM followers WHERE user_id = $1 AND follower_id = $2")
            .bind(user_id)
            .bind(follower_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_followers(&self, user_id: UserId) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.name, u.nick, u.email, u.created_at FROM users u \
             JOIN followers f ON u.id = f.follower_id WHERE f.user_id = $1 ORDER BY u.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_following(&self, user_id: UserId) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(
            "SELECT u.id, u.name, u.nick, u.email, u.created_at FROM users u \
             JOIN followers f ON u.id = f.user_id WHERE f.follower_id = $1 ORDER BY u.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Insert and author join in one statement, the same CTE shape used for every
    /// publish read.
    async fn create_publish(
        &self,
        author_id: UserId,
        publish: &PublishPayload,
    ) -> RepoResult<Publish> {
        sqlx::query_as::<_, Publish>(&format!(
            r#"
            WITH p AS (
                INSERT INTO publishes (title, content, author_id) VALUES ($1, $2, $3)
                RETURNING id, title, content, author_id, likes, created_at
            )
            SELECT {PUBLISH_COLUMNS} FROM p JOIN users u ON u.id = p.author_id
            "#
        ))
        .bind(&publish.title)
        .bind(&publish.content)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_publish(&self, id: i64) -> RepoResult<Option<Publish>> {
        sqlx::query_as::<_, Publish>(&format!(
            "SELECT {PUBLISH_COLUMNS} FROM publishes p JOIN users u ON u.id = p.author_id \
             WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// LEFT JOIN keeps the user's own publishes even when nobody follows their author;
    /// DISTINCT collapses the one row per follower edge the join produces.
    async fn get_feed(&self, user_id: UserId) -> RepoResult<Vec<Publish>> {
        sqlx::query_as::<_, Publish>(&format!(
            r#"
            SELECT DISTINCT {PUBLISH_COLUMNS}
            FROM publishes p
            JOIN users u ON u.id = p.author_id
            LEFT JOIN followers f ON f.user_id = p.author_id
            WHERE p.author_id = $1 OR f.follower_id = $1
            ORDER BY p.created_at DESC, p.id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_publishes_by_user(&self, user_id: UserId) -> RepoResult<Vec<Publish>> {
        sqlx::query_as::<_, Publish>(&format!(
            "SELECT {PUBLISH_COLUMNS} FROM publishes p JOIN users u ON u.id = p.author_id \
             WHERE p.author_id = $1 ORDER BY p.created_at DESC, p.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn update_publish(&self, id: i64, publish: &PublishPayload) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE publishes SET title = $2, content = $3 WHERE id = $1")
            .bind(id)
            .bind(&publish.title)
            .bind(&publish.content)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_publish(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM publishes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn like_publish(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE publishes SET likes = likes + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlike_publish(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE publishes SET likes = GREATEST(likes - 1, 0) WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Escapes LIKE wildcards so user input is matched literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
