use crate::{
    auth::{AuthService, PasswordHasher},
    config::{Config, MEMORY_STORAGE},
    grpc::{self, admission::Gate},
    jwt::TokenSigner,
    storage::{
        MemoryTokens, MemoryUsers, TokenCache, TokenProvider, UserDirectory, UserProvider,
        UserSaver,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub secret: SecretString,
}

/// Backing stores shared by the auth service and the admission layer.
struct Stores {
    saver: Arc<dyn UserSaver>,
    provider: Arc<dyn UserProvider>,
    tokens: Arc<dyn TokenProvider>,
    directory: Option<UserDirectory>,
    cache: Option<TokenCache>,
}

impl Stores {
    async fn open(config: &Config) -> Result<Self> {
        let (saver, provider, directory): (Arc<dyn UserSaver>, Arc<dyn UserProvider>, _) =
            if config.usersstorage == MEMORY_STORAGE {
                warn!("users storage is in memory, users are lost on restart");
                let users = Arc::new(MemoryUsers::new());
                (users.clone(), users, None)
            } else {
                let directory = UserDirectory::connect(&config.usersstorage).await?;
                directory
                    .ensure_indexes()
                    .await
                    .context("Failed to create users storage indexes")?;
                let users = Arc::new(directory.clone());
                (users.clone(), users, Some(directory))
            };

        let (tokens, cache): (Arc<dyn TokenProvider>, _) =
            if config.tokensstorage.addr == MEMORY_STORAGE {
                warn!("tokens storage is in memory, sessions are lost on restart");
                (Arc::new(MemoryTokens::new()), None)
            } else {
                let cache =
                    TokenCache::connect(&config.tokensstorage.addr, &config.tokensstorage.password)
                        .await?;
                (Arc::new(cache.clone()), Some(cache))
            };

        Ok(Self {
            saver,
            provider,
            tokens,
            directory,
            cache,
        })
    }

    // Token Cache first, then the User Directory. The shared handles go first
    // so the stores hold the last reference to each connection.
    async fn close(self) {
        let Self {
            saver,
            provider,
            tokens,
            directory,
            cache,
        } = self;
        drop((saver, provider, tokens));

        if let Some(cache) = cache {
            cache.close();
        }
        if let Some(directory) = directory {
            directory.close().await;
            debug!("users storage pool closed");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if a backing store is unreachable, the port cannot be
/// bound, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let Args { config, secret } = args;
    debug!("Config: {:?}", config);

    let hasher = PasswordHasher::from_cost(config.password)
        .map_err(|err| anyhow!("Invalid password hashing cost: {err}"))?;

    let stores = Stores::open(&config).await?;

    let auth = AuthService::new(
        stores.saver.clone(),
        stores.provider.clone(),
        stores.tokens.clone(),
        TokenSigner::new(secret),
        config.tokenttl,
    )
    .with_hasher(hasher);

    let gate = Gate::new(
        stores.provider.clone(),
        stores.tokens.clone(),
        config.grpc.caller_header.as_str(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.grpc.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    let result = grpc::serve(
        listener,
        Arc::new(auth),
        gate,
        config.grpc.timeout,
        shutdown_signal(),
    )
    .await;

    stores.close().await;

    result
}
