//! # SSO (single sign-on authority)
//!
//! `sso` registers users, turns a login and password into a signed bearer
//! token, and manages the administrative role of every account. The service
//! speaks gRPC; clients identify themselves through a caller identifier
//! (a Telegram login) carried in request metadata.
//!
//! ## Stores
//!
//! - **User Directory:** durable user records in PostgreSQL (`core.users`),
//!   unique by login and by caller identifier.
//! - **Token Cache:** Redis keys `user:<id>` holding the one live token of a
//!   user. The cache is the session of record: a user is signed in while the
//!   key exists, and logout deletes it.
//!
//! ## Admission
//!
//! Every call passes the admission layer before reaching a handler. Callers
//! without a live session may only register or authorize; callers with a
//! session may change their own password; everything else needs an admin.

pub mod auth;
pub mod cli;
pub mod config;
pub mod grpc;
pub mod jwt;
pub mod models;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
