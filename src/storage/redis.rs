//! Token Cache backed by Redis.
//!
//! Each user owns at most one key, `user:<id>`, written with `SET NX PX` so a
//! live token is never overwritten.

use super::{token_key, Error, TokenProvider};
use ::redis::{aio::ConnectionManager, AsyncCommands, Client};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, info_span, Instrument, Span};
use url::Url;

#[derive(Clone)]
pub struct TokenCache {
    conn: ConnectionManager,
}

impl TokenCache {
    /// Connect to the cache at `addr` (`host:port` or a `redis://` URL) using database 0.
    ///
    /// # Errors
    /// Returns an error if the address is invalid or the cache is unreachable.
    pub async fn connect(addr: &str, password: &SecretString) -> Result<Self> {
        let url = connection_url(addr, password)?;
        let client = Client::open(url.as_str()).context("Invalid tokens storage address")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to tokens storage")?;

        Ok(Self { conn })
    }

    /// Release this handle's managed connection.
    ///
    /// Clones share one connection, which closes once the last clone is
    /// released; callers drop the other handles first.
    pub fn close(self) {
        drop(self.conn);
        debug!("tokens storage connection closed");
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").finish_non_exhaustive()
    }
}

fn connection_url(addr: &str, password: &SecretString) -> Result<Url> {
    let addr = addr.trim();
    let mut url = if addr.starts_with("redis://") || addr.starts_with("rediss://") {
        Url::parse(addr)?
    } else {
        Url::parse(&format!("redis://{addr}"))?
    };

    if url.host_str().is_none() {
        return Err(anyhow!("tokens storage address must include a host: {addr}"));
    }

    let password = password.expose_secret();
    if !password.is_empty() {
        url.set_password(Some(password))
            .map_err(|()| anyhow!("Error setting tokens storage password"))?;
    }

    url.set_path("/0");

    Ok(url)
}

fn cache_span(command: &'static str, key: &str) -> Span {
    info_span!("cache.command", db.system = "redis", db.operation = command, key)
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl TokenProvider for TokenCache {
    async fn token(&self, user_id: i64) -> Result<String, Error> {
        let key = token_key(user_id);
        let mut conn = self.conn.clone();
        let token: Option<String> = conn
            .get(&key)
            .instrument(cache_span("GET", &key))
            .await?;

        token.ok_or(Error::TokenNotFound)
    }

    async fn save_token(&self, user_id: i64, token: &str, ttl: Duration) -> Result<(), Error> {
        let key = token_key(user_id);
        let mut conn = self.conn.clone();
        // Reply is "OK" when written, nil when the key already exists.
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(&key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .instrument(cache_span("SET", &key))
            .await?;

        match reply {
            Some(_) => Ok(()),
            None => Err(Error::TokenExists),
        }
    }

    async fn delete_token(&self, user_id: i64) -> Result<(), Error> {
        let key = token_key(user_id);
        let mut conn = self.conn.clone();
        let _removed: i64 = conn
            .del(&key)
            .instrument(cache_span("DEL", &key))
            .await?;

        Ok(())
    }
}
