//! In-process User Directory and Token Cache.
//!
//! Selected with `memory://` in the configuration; state is lost on restart.

use super::{token_key, Error, TokenProvider, UserProvider, UserSaver};
use crate::models::{NewUser, User};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};
use tokio::{sync::RwLock, time::Instant};

#[derive(Debug, Default)]
struct UsersState {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

#[derive(Debug, Default)]
pub struct MemoryUsers {
    state: RwLock<UsersState>,
}

impl MemoryUsers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserSaver for MemoryUsers {
    async fn save_user(&self, user: NewUser) -> Result<i64, Error> {
        let mut state = self.state.write().await;
        let taken = state
            .users
            .values()
            .any(|u| u.login == user.login || u.telegram_login == user.telegram_login);
        if taken {
            return Err(Error::UserExists);
        }

        state.next_id += 1;
        let id = state.next_id;
        state.users.insert(
            id,
            User {
                id,
                login: user.login,
                pass_hash: user.pass_hash,
                is_admin: false,
                telegram_login: user.telegram_login,
            },
        );
        Ok(id)
    }

    async fn change_password(&self, user_id: i64, pass_hash: &[u8]) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&user_id).ok_or(Error::UserNotFound)?;
        user.pass_hash = pass_hash.to_vec();
        Ok(())
    }

    async fn make_admin(&self, user_id: i64) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let user = state.users.get_mut(&user_id).ok_or(Error::UserNotFound)?;
        user.is_admin = true;
        Ok(())
    }
}

#[async_trait]
impl UserProvider for MemoryUsers {
    async fn user(&self, login: &str) -> Result<User, Error> {
        let state = self.state.read().await;
        state
            .users
            .values()
            .find(|u| u.login == login)
            .cloned()
            .ok_or(Error::UserNotFound)
    }

    async fn is_admin(&self, user_id: i64) -> Result<bool, Error> {
        let state = self.state.read().await;
        state
            .users
            .get(&user_id)
            .map(|u| u.is_admin)
            .ok_or(Error::UserNotFound)
    }

    async fn users_by_telegram(&self, telegram_login: &str) -> Result<Vec<User>, Error> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.telegram_login == telegram_login)
            .cloned()
            .collect())
    }

    async fn all_users(&self) -> Result<Vec<User>, Error> {
        let state = self.state.read().await;
        Ok(state.users.values().cloned().collect())
    }
}

#[derive(Debug)]
struct Entry {
    token: String,
    // None when the ttl does not fit in an `Instant`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        !matches!(self.expires_at, Some(at) if at <= now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokens {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenProvider for MemoryTokens {
    async fn token(&self, user_id: i64) -> Result<String, Error> {
        let entries = self.entries.read().await;
        match entries.get(&token_key(user_id)) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(entry.token.clone()),
            _ => Err(Error::TokenNotFound),
        }
    }

    async fn save_token(&self, user_id: i64, token: &str, ttl: Duration) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        let key = token_key(user_id);
        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        if entries.contains_key(&key) {
            return Err(Error::TokenExists);
        }
        entries.insert(
            key,
            Entry {
                token: token.to_string(),
                expires_at: now.checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn delete_token(&self, user_id: i64) -> Result<(), Error> {
        self.entries.write().await.remove(&token_key(user_id));
        Ok(())
    }
}
