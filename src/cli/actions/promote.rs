use crate::{
    config::{Config, MEMORY_STORAGE},
    storage::{UserDirectory, UserProvider, UserSaver},
};
use anyhow::{bail, Context, Result};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub login: String,
}

/// Grant the admin role to `login` directly in the User Directory.
///
/// This is how the first administrator is created: the `MakeAdmin` RPC is
/// itself admin-gated.
///
/// # Errors
/// Returns an error if the users storage is in memory or unreachable, or the
/// user does not exist.
pub async fn execute(args: Args) -> Result<()> {
    if args.config.usersstorage == MEMORY_STORAGE {
        bail!("promote needs a persistent users storage, {MEMORY_STORAGE} is per process");
    }

    let directory = UserDirectory::connect(&args.config.usersstorage).await?;
    directory
        .ensure_indexes()
        .await
        .context("Failed to create users storage indexes")?;

    let result = promote(&directory, &args.login).await;
    directory.close().await;

    let user_id = result?;
    info!(user_id, login = %args.login, "user promoted to admin");

    Ok(())
}

async fn promote(users: &UserDirectory, login: &str) -> Result<i64> {
    let user = users
        .user(login)
        .await
        .with_context(|| format!("Failed to find user: {login}"))?;

    users
        .make_admin(user.id)
        .await
        .with_context(|| format!("Failed to promote user: {login}"))?;

    Ok(user.id)
}
