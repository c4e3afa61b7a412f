//! RPC facade: argument validation and status mapping around [`AuthService`].

use super::{
    admission::Admission,
    proto::{
        auth_server::Auth, AuthorizeRequest, AuthorizeResponse, ChangePasswordRequest,
        DeleteJwtRequest, Empty, GetJwtRequest, GetJwtResponse, GetUserByTelegramRequest,
        IsAdminRequest, IsAdminResponse, ListOfUsers, MakeAdminRequest, RegisterRequest, User,
    },
};
use crate::{
    auth::{AuthService, Error},
    models::UserView,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone, Debug)]
pub struct AuthHandler {
    auth: Arc<AuthService>,
}

impl AuthHandler {
    #[must_use]
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self { auth }
    }
}

/// Translate an auth failure into the status returned to the client.
///
/// Faults outside the domain taxonomy are reported as a generic `Internal`
/// so storage details never reach the caller.
pub fn status_from(err: &Error) -> Status {
    match err {
        Error::InvalidCredentials => Status::unauthenticated("invalid credentials"),
        Error::UserExists => Status::already_exists("user already exists"),
        Error::UserNotFound => Status::not_found("user not found"),
        Error::TokenNotFound => Status::not_found("token not found"),
        Error::TokenExists => Status::internal("user already has an active token"),
        Error::Hash(_) | Error::Token(_) | Error::Storage(_) => Status::internal("internal error"),
    }
}

fn required(value: &str, message: &'static str) -> Result<(), Status> {
    if value.is_empty() {
        return Err(Status::invalid_argument(message));
    }
    Ok(())
}

impl From<UserView> for User {
    fn from(view: UserView) -> Self {
        Self {
            user_id: view.user_id,
            login: view.login,
            password: view.password,
            is_admin: view.is_admin,
            telegram_login: view.telegram_login,
        }
    }
}

fn list(views: Vec<UserView>) -> ListOfUsers {
    ListOfUsers {
        users: views.into_iter().map(User::from).collect(),
    }
}

#[tonic::async_trait]
impl Auth for AuthHandler {
    async fn register_new_user(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        required(&req.login, "login is required")?;
        required(&req.password, "password is required")?;
        required(&req.telegram_login, "telegram login is required")?;

        self.auth
            .register_user(&req.login, &req.password, &req.telegram_login)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(Empty {}))
    }

    async fn authorize_user(
        &self,
        request: Request<AuthorizeRequest>,
    ) -> Result<Response<AuthorizeResponse>, Status> {
        let req = request.into_inner();
        required(&req.login, "login is required")?;
        required(&req.password, "password is required")?;

        let token = self
            .auth
            .authorize_user(&req.login, &req.password)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(AuthorizeResponse { token }))
    }

    async fn is_admin(
        &self,
        request: Request<IsAdminRequest>,
    ) -> Result<Response<IsAdminResponse>, Status> {
        let req = request.into_inner();

        let is_admin = self
            .auth
            .is_admin(req.user_id)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(IsAdminResponse { is_admin }))
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> Result<Response<Empty>, Status> {
        let admission = request.extensions().get::<Admission>().copied();
        let req = request.into_inner();
        required(&req.new_password, "new password is required")?;

        // Non-admins may only change their own password.
        if let Some(admission) = admission {
            if !admission.is_admin() && admission.user_id() != Some(req.user_id) {
                return Err(Status::permission_denied(
                    "cannot change another user's password",
                ));
            }
        }

        self.auth
            .change_password(req.user_id, &req.new_password)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(Empty {}))
    }

    async fn get_all_users(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ListOfUsers>, Status> {
        let users = self
            .auth
            .all_users()
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(list(users)))
    }

    async fn get_user_by_telegram(
        &self,
        request: Request<GetUserByTelegramRequest>,
    ) -> Result<Response<ListOfUsers>, Status> {
        let req = request.into_inner();
        required(&req.telegram_login, "telegram login is required")?;

        let users = self
            .auth
            .users_by_telegram(&req.telegram_login)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(list(users)))
    }

    async fn make_admin(
        &self,
        request: Request<MakeAdminRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();

        self.auth
            .make_admin(req.user_id)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(Empty {}))
    }

    async fn get_jwt(
        &self,
        request: Request<GetJwtRequest>,
    ) -> Result<Response<GetJwtResponse>, Status> {
        let req = request.into_inner();

        let token = self
            .auth
            .token(req.user_id)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(GetJwtResponse { token }))
    }

    async fn delete_jwt(
        &self,
        request: Request<DeleteJwtRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();

        self.auth
            .delete_token(req.user_id)
            .await
            .map_err(|err| status_from(&err))?;

        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        auth::PasswordHasher,
        jwt::TokenSigner,
        storage::{self, MemoryTokens, MemoryUsers},
    };
    use argon2::Params;
    use secrecy::SecretString;
    use std::time::Duration;
    use tonic::Code;

    fn handler() -> AuthHandler {
        let users = Arc::new(MemoryUsers::new());
        let tokens = Arc::new(MemoryTokens::new());
        let signer = TokenSigner::new(SecretString::from("test-secret".to_string()));
        let auth = AuthService::new(
            users.clone(),
            users,
            tokens,
            signer,
            Duration::from_secs(3600),
        )
        .with_hasher(PasswordHasher::new(Params::new(64, 1, 1, None).unwrap()));
        AuthHandler::new(Arc::new(auth))
    }

    fn register(login: &str, password: &str, telegram: &str) -> Request<RegisterRequest> {
        Request::new(RegisterRequest {
            login: login.to_string(),
            password: password.to_string(),
            telegram_login: telegram.to_string(),
        })
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_from(&Error::InvalidCredentials).code(),
            Code::Unauthenticated
        );
        assert_eq!(status_from(&Error::UserExists).code(), Code::AlreadyExists);
        assert_eq!(status_from(&Error::UserNotFound).code(), Code::NotFound);
        assert_eq!(status_from(&Error::TokenNotFound).code(), Code::NotFound);
        assert_eq!(status_from(&Error::TokenExists).code(), Code::Internal);

        let status = status_from(&Error::Storage(storage::Error::Database(
            sqlx::Error::PoolClosed,
        )));
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "internal error");
    }

    #[tokio::test]
    async fn register_validates_fields() {
        let handler = handler();

        let status = handler
            .register_new_user(register("", "x", "tg"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "login is required");

        let status = handler
            .register_new_user(register("a", "", "tg"))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "password is required");

        let status = handler
            .register_new_user(register("a", "x", ""))
            .await
            .unwrap_err();
        assert_eq!(status.message(), "telegram login is required");
    }

    #[tokio::test]
    async fn whitespace_values_are_not_empty() {
        let handler = handler();
        handler
            .register_new_user(register(" ", " ", " "))
            .await
            .unwrap();

        let found = handler
            .get_user_by_telegram(Request::new(GetUserByTelegramRequest {
                telegram_login: " ".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(found.users.len(), 1);
    }

    #[tokio::test]
    async fn register_then_authorize() {
        let handler = handler();
        handler
            .register_new_user(register("a", "x", "tg-a"))
            .await
            .unwrap();

        let status = handler
            .register_new_user(register("a", "x", "tg-a"))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::AlreadyExists);

        let token = handler
            .authorize_user(Request::new(AuthorizeRequest {
                login: "a".to_string(),
                password: "x".to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
            .token;
        assert!(!token.is_empty());

        let status = handler
            .authorize_user(Request::new(AuthorizeRequest {
                login: "a".to_string(),
                password: "wrong".to_string(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unauthenticated);
    }

    #[tokio::test]
    async fn change_password_of_another_user_needs_admin() {
        let handler = handler();
        handler
            .register_new_user(register("a", "x", "tg-a"))
            .await
            .unwrap();

        let mut request = Request::new(ChangePasswordRequest {
            user_id: 999,
            new_password: "y".to_string(),
        });
        request
            .extensions_mut()
            .insert(Admission::Session { user_id: 1 });
        let status = handler.change_password(request).await.unwrap_err();
        assert_eq!(status.code(), Code::PermissionDenied);

        let mut request = Request::new(ChangePasswordRequest {
            user_id: 999,
            new_password: "y".to_string(),
        });
        request
            .extensions_mut()
            .insert(Admission::Admin { user_id: 1 });
        let status = handler.change_password(request).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
    }

    #[tokio::test]
    async fn change_password_requires_new_password() {
        let handler = handler();
        let status = handler
            .change_password(Request::new(ChangePasswordRequest {
                user_id: 1,
                new_password: String::new(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "new password is required");
    }

    #[tokio::test]
    async fn get_jwt_without_session_is_not_found() {
        let handler = handler();
        let status = handler
            .get_jwt(Request::new(GetJwtRequest { user_id: 1 }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        handler
            .delete_jwt(Request::new(DeleteJwtRequest { user_id: 1 }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn listing_users() {
        let handler = handler();
        handler
            .register_new_user(register("a", "x", "tg-a"))
            .await
            .unwrap();
        handler
            .register_new_user(register("b", "x", "tg-b"))
            .await
            .unwrap();

        let all = handler
            .get_all_users(Request::new(Empty {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(all.users.len(), 2);

        let found = handler
            .get_user_by_telegram(Request::new(GetUserByTelegramRequest {
                telegram_login: "tg-b".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(found.users.len(), 1);
        assert_eq!(found.users[0].login, "b");
        assert!(!found.users[0].is_admin);
    }
}
