//! User records as stored in the User Directory.

/// A persisted user.
///
/// `pass_hash` holds an Argon2id PHC string; the plaintext password is never
/// stored.
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub pass_hash: Vec<u8>,
    pub is_admin: bool,
    pub telegram_login: String,
}

/// Fields supplied when a user is created; the directory assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub login: String,
    pub pass_hash: Vec<u8>,
    pub telegram_login: String,
}

/// Administrative projection of a user returned by the list operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserView {
    pub user_id: i64,
    pub login: String,
    pub password: String,
    pub is_admin: bool,
    pub telegram_login: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            login: user.login,
            password: String::from_utf8_lossy(&user.pass_hash).into_owned(),
            is_admin: user.is_admin,
            telegram_login: user.telegram_login,
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("pass_hash", &"***")
            .field("is_admin", &self.is_admin)
            .field("telegram_login", &self.telegram_login)
            .finish()
    }
}
