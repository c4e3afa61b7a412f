//! HS256 bearer tokens minted on successful authorization.
//!
//! Tokens carry `uid`, `login` and `exp` (Unix seconds) and are signed with
//! the process-wide secret taken from `SECRET` at startup. Downstream
//! services verify them with the same secret.

use crate::models::User;
use jsonwebtoken::{
    errors::Error, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: i64,
    pub login: String,
    pub exp: u64,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: SecretString,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Sign a token for `user` that expires `ttl` from now.
    ///
    /// `exp` is in whole seconds, so a fractional `ttl` is rounded up.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn new_token(&self, user: &User, ttl: Duration) -> Result<String, Error> {
        let claims = Claims {
            uid: user.id,
            login: user.login.clone(),
            exp: get_current_timestamp().saturating_add(ttl_secs(ttl)),
        };
        let key = EncodingKey::from_secret(self.secret.expose_secret().as_bytes());
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
    }

    /// Verify the signature and expiry of `token` and return its claims.
    ///
    /// # Errors
    /// Returns an error if the token is malformed, signed with another secret, or expired.
    pub fn verify(&self, token: &str) -> Result<Claims, Error> {
        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        jsonwebtoken::decode::<Claims>(token, &key, &validation).map(|data| data.claims)
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0))
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"***")
            .finish()
    }
}
