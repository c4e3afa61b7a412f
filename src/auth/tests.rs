#![allow(clippy::unwrap_used)]

use super::*;
use crate::storage::{MemoryTokens, MemoryUsers};
use argon2::Params;
use secrecy::SecretString;

struct Fixture {
    auth: AuthService,
    signer: TokenSigner,
    users: Arc<MemoryUsers>,
}

fn fixture(ttl: Duration) -> Fixture {
    let users = Arc::new(MemoryUsers::new());
    let tokens = Arc::new(MemoryTokens::new());
    let signer = TokenSigner::new(SecretString::from("test-secret".to_string()));
    let hasher = PasswordHasher::new(Params::new(64, 1, 1, None).unwrap());
    let auth = AuthService::new(users.clone(), users.clone(), tokens, signer.clone(), ttl)
        .with_hasher(hasher);

    Fixture {
        auth,
        signer,
        users,
    }
}

fn hour() -> Duration {
    Duration::from_secs(3600)
}

#[tokio::test]
async fn register_then_authorize_yields_matching_claims() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    let token = f.auth.authorize_user("alice", "x").await.unwrap();
    let claims = f.signer.verify(&token).unwrap();
    assert_eq!(claims.uid, id);
    assert_eq!(claims.login, "alice");
    assert_eq!(f.auth.token(id).await.unwrap(), token);
}

#[tokio::test]
async fn registered_user_is_not_admin_and_hash_is_not_plaintext() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    assert!(!f.auth.is_admin(id).await.unwrap());
    let stored = f.users.user("alice").await.unwrap();
    assert_ne!(stored.pass_hash, b"x");
    assert!(stored.pass_hash.starts_with(b"$argon2id$"));
}

#[tokio::test]
async fn wrong_password_and_unknown_login_are_indistinguishable() {
    let f = fixture(hour());
    f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    assert!(matches!(
        f.auth.authorize_user("alice", "wrong").await,
        Err(Error::InvalidCredentials)
    ));
    assert!(matches!(
        f.auth.authorize_user("no-such-user", "x").await,
        Err(Error::InvalidCredentials)
    ));
}

#[tokio::test]
async fn duplicate_login_or_telegram_is_rejected() {
    let f = fixture(hour());
    f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    assert!(matches!(
        f.auth.register_user("alice", "y", "tg-other").await,
        Err(Error::UserExists)
    ));
    assert!(matches!(
        f.auth.register_user("bob", "y", "tg-alice").await,
        Err(Error::UserExists)
    ));
    assert_eq!(f.auth.all_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn second_authorize_keeps_the_live_token() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();
    let first = f.auth.authorize_user("alice", "x").await.unwrap();

    assert!(matches!(
        f.auth.authorize_user("alice", "x").await,
        Err(Error::TokenExists)
    ));
    assert_eq!(f.auth.token(id).await.unwrap(), first);
}

#[tokio::test]
async fn authorize_succeeds_again_after_ttl() {
    let f = fixture(Duration::from_millis(50));
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();
    f.auth.authorize_user("alice", "x").await.unwrap();

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(matches!(f.auth.token(id).await, Err(Error::TokenNotFound)));
    f.auth.authorize_user("alice", "x").await.unwrap();
}

#[tokio::test]
async fn concurrent_authorizations_produce_one_session() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    let (a, b) = tokio::join!(
        f.auth.authorize_user("alice", "x"),
        f.auth.authorize_user("alice", "x")
    );
    let winners: Vec<String> = [a, b].into_iter().filter_map(Result::ok).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(f.auth.token(id).await.unwrap(), winners[0]);
}

#[tokio::test]
async fn delete_token_ends_the_session() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();
    f.auth.authorize_user("alice", "x").await.unwrap();

    f.auth.delete_token(id).await.unwrap();
    assert!(matches!(f.auth.token(id).await, Err(Error::TokenNotFound)));
    f.auth.delete_token(id).await.unwrap();
    f.auth.authorize_user("alice", "x").await.unwrap();
}

#[tokio::test]
async fn make_admin_is_monotonic() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    f.auth.make_admin(id).await.unwrap();
    assert!(f.auth.is_admin(id).await.unwrap());
    f.auth.make_admin(id).await.unwrap();
    assert!(f.auth.is_admin(id).await.unwrap());
}

#[tokio::test]
async fn unknown_user_ids() {
    let f = fixture(hour());

    assert!(matches!(f.auth.make_admin(404).await, Err(Error::UserNotFound)));
    assert!(matches!(
        f.auth.change_password(404, "y").await,
        Err(Error::UserNotFound)
    ));
    assert!(matches!(
        f.auth.is_admin(404).await,
        Err(Error::Storage(storage::Error::UserNotFound))
    ));
    assert!(matches!(f.auth.token(404).await, Err(Error::TokenNotFound)));
}

#[tokio::test]
async fn change_password_swaps_credentials() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();

    f.auth.change_password(id, "y").await.unwrap();
    assert!(matches!(
        f.auth.authorize_user("alice", "x").await,
        Err(Error::InvalidCredentials)
    ));
    f.auth.authorize_user("alice", "y").await.unwrap();
}

#[tokio::test]
async fn users_by_telegram_returns_views() {
    let f = fixture(hour());
    let id = f.auth.register_user("alice", "x", "tg-alice").await.unwrap();
    f.auth.register_user("bob", "x", "tg-bob").await.unwrap();

    let views = f.auth.users_by_telegram("tg-alice").await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].user_id, id);
    assert_eq!(views[0].login, "alice");
    assert_eq!(views[0].telegram_login, "tg-alice");
    assert!(views[0].password.starts_with("$argon2id$"));

    assert!(f.auth.users_by_telegram("tg-nobody").await.unwrap().is_empty());
}

#[test]
fn storage_errors_map_to_domain_errors() {
    assert!(matches!(
        Error::from(storage::Error::UserExists),
        Error::UserExists
    ));
    assert!(matches!(
        Error::from(storage::Error::TokenNotFound),
        Error::TokenNotFound
    ));
    assert!(matches!(
        Error::from(storage::Error::Database(sqlx::Error::PoolClosed)),
        Error::Storage(_)
    ));
    assert!(Error::InvalidCredentials.is_domain());
    assert!(!Error::Hash("boom".to_string()).is_domain());
}
