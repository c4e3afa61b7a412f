//! Auth Service: registration, authorization, role and token management.
//!
//! `AuthService` holds no state of its own. It composes the User Directory,
//! the Token Cache and the Token Signer through the capability traits in
//! [`crate::storage`], so any backend (or an in-memory double) can sit behind it.

mod password;

#[cfg(test)]
mod tests;

pub use password::PasswordHasher;

use crate::{
    jwt::TokenSigner,
    models::{NewUser, UserView},
    storage::{self, TokenProvider, UserProvider, UserSaver},
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, field, info, instrument, warn, Span};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user already exists")]
    UserExists,
    #[error("user not found")]
    UserNotFound,
    #[error("token for that user already exists")]
    TokenExists,
    #[error("token for that user not found")]
    TokenNotFound,
    #[error("password hashing: {0}")]
    Hash(String),
    #[error("token signing: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("storage: {0}")]
    Storage(#[source] storage::Error),
}

impl Error {
    /// Whether this is an expected outcome of the operation rather than a fault.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::UserExists
                | Self::UserNotFound
                | Self::TokenExists
                | Self::TokenNotFound
        )
    }
}

impl From<storage::Error> for Error {
    fn from(err: storage::Error) -> Self {
        match err {
            storage::Error::UserExists => Self::UserExists,
            storage::Error::UserNotFound => Self::UserNotFound,
            storage::Error::TokenExists => Self::TokenExists,
            storage::Error::TokenNotFound => Self::TokenNotFound,
            other => Self::Storage(other),
        }
    }
}

// Log the failure inside the current operation span and hand it back.
fn report(err: impl Into<Error>) -> Error {
    let err = err.into();
    if err.is_domain() {
        warn!(error = %err, "operation failed");
    } else {
        error!(error = %err, "operation failed");
    }
    err
}

pub struct AuthService {
    saver: Arc<dyn UserSaver>,
    provider: Arc<dyn UserProvider>,
    tokens: Arc<dyn TokenProvider>,
    signer: TokenSigner,
    hasher: PasswordHasher,
    token_ttl: Duration,
}

impl AuthService {
    #[must_use]
    pub fn new(
        saver: Arc<dyn UserSaver>,
        provider: Arc<dyn UserProvider>,
        tokens: Arc<dyn TokenProvider>,
        signer: TokenSigner,
        token_ttl: Duration,
    ) -> Self {
        Self {
            saver,
            provider,
            tokens,
            signer,
            hasher: PasswordHasher::default(),
            token_ttl,
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Create a non-admin user and return its id.
    ///
    /// # Errors
    /// [`Error::UserExists`] when the login or Telegram login is taken.
    #[instrument(skip_all, fields(op = "register_user", login = %login))]
    pub async fn register_user(
        &self,
        login: &str,
        password: &str,
        telegram_login: &str,
    ) -> Result<i64, Error> {
        let pass_hash = self.hasher.hash(password).await.map_err(report)?;

        let user_id = self
            .saver
            .save_user(NewUser {
                login: login.to_string(),
                pass_hash,
                telegram_login: telegram_login.to_string(),
            })
            .await
            .map_err(report)?;

        info!(user_id, "user registered");
        Ok(user_id)
    }

    /// Check credentials and start a session, returning the new bearer token.
    ///
    /// An unknown login and a wrong password both yield
    /// [`Error::InvalidCredentials`]. A user that already holds a live token
    /// gets [`Error::TokenExists`]; the existing token is left untouched.
    ///
    /// # Errors
    /// See above; storage, hashing and signing faults are passed through.
    #[instrument(skip_all, fields(op = "authorize_user", login = %login, user_id = field::Empty))]
    pub async fn authorize_user(&self, login: &str, password: &str) -> Result<String, Error> {
        let user = match self.provider.user(login).await {
            Ok(user) => user,
            Err(storage::Error::UserNotFound) => return Err(report(Error::InvalidCredentials)),
            Err(err) => return Err(report(err)),
        };
        Span::current().record("user_id", user.id);

        if !self
            .hasher
            .verify(password, &user.pass_hash)
            .await
            .map_err(report)?
        {
            return Err(report(Error::InvalidCredentials));
        }

        let token = self
            .signer
            .new_token(&user, self.token_ttl)
            .map_err(report)?;

        self.tokens
            .save_token(user.id, &token, self.token_ttl)
            .await
            .map_err(report)?;

        info!("user authorized");
        Ok(token)
    }

    /// # Errors
    /// Any directory failure, an unknown id included, is reported as [`Error::Storage`].
    #[instrument(skip_all, fields(op = "is_admin", user_id = user_id))]
    pub async fn is_admin(&self, user_id: i64) -> Result<bool, Error> {
        self.provider
            .is_admin(user_id)
            .await
            .map_err(|err| report(Error::Storage(err)))
    }

    /// # Errors
    /// [`Error::UserNotFound`] when no user has `user_id`.
    #[instrument(skip_all, fields(op = "change_password", user_id = user_id))]
    pub async fn change_password(&self, user_id: i64, new_password: &str) -> Result<(), Error> {
        let pass_hash = self.hasher.hash(new_password).await.map_err(report)?;
        self.saver
            .change_password(user_id, &pass_hash)
            .await
            .map_err(report)?;

        info!("password changed");
        Ok(())
    }

    /// # Errors
    /// Returns an error if the directory lookup fails.
    #[instrument(skip_all, fields(op = "users_by_telegram", telegram_login = %telegram_login))]
    pub async fn users_by_telegram(&self, telegram_login: &str) -> Result<Vec<UserView>, Error> {
        let users = self
            .provider
            .users_by_telegram(telegram_login)
            .await
            .map_err(report)?;

        debug!(count = users.len(), "users found");
        Ok(users.into_iter().map(UserView::from).collect())
    }

    /// # Errors
    /// Returns an error if the directory lookup fails.
    #[instrument(skip_all, fields(op = "all_users"))]
    pub async fn all_users(&self) -> Result<Vec<UserView>, Error> {
        let users = self.provider.all_users().await.map_err(report)?;
        Ok(users.into_iter().map(UserView::from).collect())
    }

    /// Grant the admin role. Granting it twice is not an error.
    ///
    /// # Errors
    /// [`Error::UserNotFound`] when no user has `user_id`.
    #[instrument(skip_all, fields(op = "make_admin", user_id = user_id))]
    pub async fn make_admin(&self, user_id: i64) -> Result<(), Error> {
        self.saver.make_admin(user_id).await.map_err(report)?;

        info!("user promoted to admin");
        Ok(())
    }

    /// # Errors
    /// [`Error::TokenNotFound`] when the user has no live token.
    #[instrument(skip_all, fields(op = "token", user_id = user_id))]
    pub async fn token(&self, user_id: i64) -> Result<String, Error> {
        self.tokens.token(user_id).await.map_err(report)
    }

    /// End the user's session. Succeeds whether or not a token was live.
    ///
    /// # Errors
    /// Returns an error if the cache is unreachable.
    #[instrument(skip_all, fields(op = "delete_token", user_id = user_id))]
    pub async fn delete_token(&self, user_id: i64) -> Result<(), Error> {
        self.tokens.delete_token(user_id).await.map_err(report)?;

        debug!("token deleted");
        Ok(())
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("signer", &self.signer)
            .field("hasher", &self.hasher)
            .field("token_ttl", &self.token_ttl)
            .finish_non_exhaustive()
    }
}
