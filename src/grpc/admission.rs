//! Admission middleware.
//!
//! Every inbound RPC passes through [`AdmissionLayer`] before it reaches the
//! handlers. The caller identifier header is resolved to the caller's user
//! records, a live token in the Token Cache marks the active session, and the
//! method is classified as public, user-scoped or admin-gated. Admitted
//! requests carry the resulting [`Admission`] in their extensions.

use crate::storage::{self, TokenProvider, UserProvider};
use http::HeaderMap;
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tonic::{body::BoxBody, codegen::BoxFuture, Status};
use tower::{Layer, Service};
use tracing::{debug, warn};

/// RPCs of the `sso.v1.Auth` service, keyed by the last path segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RpcMethod {
    RegisterNewUser,
    AuthorizeUser,
    IsAdmin,
    ChangePassword,
    GetAllUsers,
    GetUserByTelegram,
    MakeAdmin,
    GetJwt,
    DeleteJwt,
    Unknown,
}

impl RpcMethod {
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.rsplit('/').next().unwrap_or_default() {
            "RegisterNewUser" => Self::RegisterNewUser,
            "AuthorizeUser" => Self::AuthorizeUser,
            "IsAdmin" => Self::IsAdmin,
            "ChangePassword" => Self::ChangePassword,
            "GetAllUsers" => Self::GetAllUsers,
            "GetUserByTelegram" => Self::GetUserByTelegram,
            "MakeAdmin" => Self::MakeAdmin,
            "GetJWT" => Self::GetJwt,
            "DeleteJWT" => Self::DeleteJwt,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn is_public(self) -> bool {
        matches!(self, Self::RegisterNewUser | Self::AuthorizeUser)
    }
}

/// Outcome of admission, attached to the request extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Public method, caller without an active session.
    Public,
    /// Caller with an active session and no admin role.
    Session { user_id: i64 },
    /// Caller with an active session and the admin role.
    Admin { user_id: i64 },
}

impl Admission {
    #[must_use]
    pub fn user_id(self) -> Option<i64> {
        match self {
            Self::Public => None,
            Self::Session { user_id } | Self::Admin { user_id } => Some(user_id),
        }
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin { .. })
    }
}

// Headers every gRPC client sends; they do not count as caller metadata.
fn is_transport_header(name: &str) -> bool {
    matches!(
        name,
        "content-type" | "te" | "user-agent" | "host" | "content-length" | "accept-encoding"
    ) || name.starts_with("grpc-")
}

/// The admission decision procedure, shared by every connection.
#[derive(Clone)]
pub struct Gate {
    users: Arc<dyn UserProvider>,
    tokens: Arc<dyn TokenProvider>,
    caller_header: String,
}

impl Gate {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserProvider>,
        tokens: Arc<dyn TokenProvider>,
        caller_header: impl Into<String>,
    ) -> Self {
        Self {
            users,
            tokens,
            caller_header: caller_header.into(),
        }
    }

    /// Extract the caller identifier from request headers.
    ///
    /// # Errors
    /// `Unauthenticated` when no metadata was sent or the caller header is missing.
    pub fn caller(&self, headers: &HeaderMap) -> Result<String, Status> {
        if headers.keys().all(|name| is_transport_header(name.as_str())) {
            return Err(Status::unauthenticated("missing metadata"));
        }

        headers
            .get(self.caller_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| Status::unauthenticated("missing login in header"))
    }

    /// Classify a call to `method` made by `caller`.
    ///
    /// # Errors
    /// `Unauthenticated`, `PermissionDenied` or `Internal` when the call is rejected.
    pub async fn admit(&self, method: RpcMethod, caller: &str) -> Result<Admission, Status> {
        let users = match self.users.users_by_telegram(caller).await {
            Ok(users) => users,
            Err(storage::Error::UserNotFound) if method == RpcMethod::RegisterNewUser => {
                return Ok(Admission::Public);
            }
            Err(err) => {
                warn!(caller, error = %err, "caller lookup failed");
                return Err(Status::unauthenticated("caller not found"));
            }
        };

        let mut session = None;
        for user in &users {
            match self.tokens.token(user.id).await {
                Ok(_) => {
                    session = Some(user.id);
                    break;
                }
                Err(storage::Error::TokenNotFound) => {}
                Err(err) => warn!(user_id = user.id, error = %err, "session lookup failed"),
            }
        }

        let Some(user_id) = session else {
            if method.is_public() {
                return Ok(Admission::Public);
            }
            return Err(Status::unauthenticated("no session"));
        };

        if method.is_public() {
            return Err(Status::permission_denied("caller already has a session"));
        }

        if method == RpcMethod::ChangePassword {
            // Admins may change other users' passwords, so the role still matters here.
            let is_admin = self.users.is_admin(user_id).await.unwrap_or_else(|err| {
                warn!(user_id, error = %err, "admin check failed");
                false
            });
            return Ok(if is_admin {
                Admission::Admin { user_id }
            } else {
                Admission::Session { user_id }
            });
        }

        match self.users.is_admin(user_id).await {
            Ok(true) => Ok(Admission::Admin { user_id }),
            Ok(false) => Err(Status::permission_denied("admin role required")),
            Err(err) => {
                warn!(user_id, error = %err, "admin check failed");
                Err(Status::internal("error checking admin status"))
            }
        }
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("caller_header", &self.caller_header)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct AdmissionLayer {
    gate: Gate,
}

impl AdmissionLayer {
    #[must_use]
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdmissionService<S> {
    inner: S,
    gate: Gate,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for AdmissionService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        // The instance that was polled ready serves this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let gate = self.gate.clone();

        let method = RpcMethod::from_path(req.uri().path());
        let caller = gate.caller(req.headers());

        Box::pin(async move {
            let admission = match caller {
                Ok(caller) => gate.admit(method, &caller).await,
                Err(status) => Err(status),
            };

            match admission {
                Ok(admission) => {
                    debug!(?method, ?admission, "request admitted");
                    req.extensions_mut().insert(admission);
                    inner.call(req).await
                }
                Err(status) => {
                    debug!(?method, code = ?status.code(), "request rejected");
                    Ok(status.into_http())
                }
            }
        })
    }
}
