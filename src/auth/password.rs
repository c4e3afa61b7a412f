//! Argon2id password hashing.
//!
//! Hashing and verification are CPU-bound, so both run on the blocking pool.

use super::Error;
use crate::config::PasswordCost;
use argon2::{
    password_hash::{
        rand_core::OsRng, Error as HashError, PasswordHash, PasswordHasher as _,
        PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use tokio::task;

#[derive(Clone, Debug, Default)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Build a hasher from configured cost, using library defaults for unset fields.
    ///
    /// # Errors
    /// Returns an error if the parameters are outside the ranges Argon2 accepts.
    pub fn from_cost(cost: PasswordCost) -> Result<Self, argon2::Error> {
        let params = Params::new(
            cost.memory_kib.unwrap_or(Params::DEFAULT_M_COST),
            cost.iterations.unwrap_or(Params::DEFAULT_T_COST),
            cost.parallelism.unwrap_or(Params::DEFAULT_P_COST),
            None,
        )?;
        Ok(Self::new(params))
    }

    /// Hash `password` with a fresh salt and return the PHC string bytes.
    pub async fn hash(&self, password: &str) -> Result<Vec<u8>, Error> {
        let params = self.params.clone();
        let password = password.to_string();
        task::spawn_blocking(move || {
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|phc| phc.to_string().into_bytes())
                .map_err(|err| Error::Hash(err.to_string()))
        })
        .await
        .map_err(|err| Error::Hash(err.to_string()))?
    }

    /// Check `password` against a stored PHC hash.
    ///
    /// Returns `Ok(false)` on mismatch and an error when the stored hash is unreadable.
    pub async fn verify(&self, password: &str, pass_hash: &[u8]) -> Result<bool, Error> {
        let password = password.to_string();
        let pass_hash = pass_hash.to_vec();
        task::spawn_blocking(move || {
            let encoded =
                std::str::from_utf8(&pass_hash).map_err(|err| Error::Hash(err.to_string()))?;
            let parsed = PasswordHash::new(encoded).map_err(|err| Error::Hash(err.to_string()))?;
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(HashError::Password) => Ok(false),
                Err(err) => Err(Error::Hash(err.to_string())),
            }
        })
        .await
        .map_err(|err| Error::Hash(err.to_string()))?
    }
}
