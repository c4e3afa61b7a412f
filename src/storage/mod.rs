//! Persistence contracts for the User Directory and the Token Cache.
//!
//! The auth service and the admission layer only see the capability traits
//! below. `postgres` and `redis` back them in production; `memory` keeps
//! everything in-process for local runs and tests.

pub mod memory;
pub mod postgres;
pub mod redis;

use crate::models::{NewUser, User};
use async_trait::async_trait;
use std::time::Duration;

pub use self::memory::{MemoryTokens, MemoryUsers};
pub use self::postgres::UserDirectory;
pub use self::redis::TokenCache;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("user already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("token for that user already exists")]
    TokenExists,
    #[error("token for that user not found")]
    TokenNotFound,
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cache: {0}")]
    Cache(#[from] ::redis::RedisError),
}

/// Writes to the User Directory.
#[async_trait]
pub trait UserSaver: Send + Sync {
    /// Insert a new, non-admin user and return the id assigned to it.
    ///
    /// Fails with [`Error::UserExists`] when the login or Telegram login is taken.
    async fn save_user(&self, user: NewUser) -> Result<i64, Error>;

    async fn change_password(&self, user_id: i64, pass_hash: &[u8]) -> Result<(), Error>;

    async fn make_admin(&self, user_id: i64) -> Result<(), Error>;
}

/// Reads from the User Directory.
#[async_trait]
pub trait UserProvider: Send + Sync {
    async fn user(&self, login: &str) -> Result<User, Error>;

    async fn is_admin(&self, user_id: i64) -> Result<bool, Error>;

    /// All users registered under `telegram_login`; empty when there are none.
    async fn users_by_telegram(&self, telegram_login: &str) -> Result<Vec<User>, Error>;

    async fn all_users(&self) -> Result<Vec<User>, Error>;
}

/// Live bearer tokens, at most one per user.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, user_id: i64) -> Result<String, Error>;

    /// Store `token` for `ttl` unless the user already holds a live token,
    /// in which case it fails with [`Error::TokenExists`].
    async fn save_token(&self, user_id: i64, token: &str, ttl: Duration) -> Result<(), Error>;

    /// Remove the user's token; succeeds whether or not one existed.
    async fn delete_token(&self, user_id: i64) -> Result<(), Error>;
}

/// Cache key holding the token of `user_id`.
#[must_use]
pub fn token_key(user_id: i64) -> String {
    format!("user:{user_id}")
}
