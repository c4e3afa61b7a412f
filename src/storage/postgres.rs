//! User Directory backed by PostgreSQL (`core.users`).

use super::{Error, UserProvider, UserSaver};
use crate::models::{NewUser, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument, Span};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

#[derive(Clone, Debug)]
pub struct UserDirectory {
    pool: PgPool,
}

impl UserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database is unreachable.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .max_lifetime(Duration::from_secs(60 * 30))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to users storage")?;

        Ok(Self::new(pool))
    }

    /// Create the `core.users` table and its unique indices if they are missing.
    ///
    /// # Errors
    /// Returns an error if a schema statement fails.
    pub async fn ensure_indexes(&self) -> Result<(), Error> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(db_span("CREATE", "core.users schema"))
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserSaver for UserDirectory {
    async fn save_user(&self, user: NewUser) -> Result<i64, Error> {
        let query = r"
            INSERT INTO core.users (login, pass_hash, is_admin, telegram_login)
            VALUES ($1, $2, FALSE, $3)
            RETURNING id
        ";
        let row = sqlx::query(query)
            .bind(&user.login)
            .bind(&user.pass_hash)
            .bind(&user.telegram_login)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match row {
            Ok(row) => Ok(row.try_get("id")?),
            Err(err) if is_unique_violation(&err) => Err(Error::UserExists),
            Err(err) => Err(err.into()),
        }
    }

    async fn change_password(&self, user_id: i64, pass_hash: &[u8]) -> Result<(), Error> {
        let query = "UPDATE core.users SET pass_hash = $2 WHERE id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(pass_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound);
        }
        Ok(())
    }

    async fn make_admin(&self, user_id: i64) -> Result<(), Error> {
        let query = "UPDATE core.users SET is_admin = TRUE WHERE id = $1";
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::UserNotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl UserProvider for UserDirectory {
    async fn user(&self, login: &str) -> Result<User, Error> {
        let query = r"
            SELECT id, login, pass_hash, is_admin, telegram_login
            FROM core.users
            WHERE login = $1
        ";
        sqlx::query_as::<_, User>(query)
            .bind(login)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?
            .ok_or(Error::UserNotFound)
    }

    async fn is_admin(&self, user_id: i64) -> Result<bool, Error> {
        let query = "SELECT is_admin FROM core.users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?
            .ok_or(Error::UserNotFound)?;

        Ok(row.try_get("is_admin")?)
    }

    async fn users_by_telegram(&self, telegram_login: &str) -> Result<Vec<User>, Error> {
        let query = r"
            SELECT id, login, pass_hash, is_admin, telegram_login
            FROM core.users
            WHERE telegram_login = $1
            ORDER BY id
        ";
        Ok(sqlx::query_as::<_, User>(query)
            .bind(telegram_login)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?)
    }

    async fn all_users(&self) -> Result<Vec<User>, Error> {
        let query = r"
            SELECT id, login, pass_hash, is_admin, telegram_login
            FROM core.users
            ORDER BY id
        ";
        Ok(sqlx::query_as::<_, User>(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?)
    }
}
