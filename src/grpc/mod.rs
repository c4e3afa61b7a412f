//! gRPC surface: generated protobuf types, the admission middleware and the
//! RPC facade, wired into a tonic server.

pub mod admission;
pub mod handlers;

pub mod proto {
    #![allow(clippy::all, clippy::pedantic)]
    tonic::include_proto!("sso.v1");
}

use crate::auth::AuthService;
use admission::{AdmissionLayer, Gate};
use anyhow::{Context, Result};
use handlers::AuthHandler;
use proto::auth_server::AuthServer;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tower::ServiceBuilder;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{info, info_span, Span};
use ulid::Ulid;

// span
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        info_span!(
            "grpc-request",
            rpc.method = %request.uri().path(),
            request_id = %Ulid::new()
        )
    }
}

/// Serve the `Auth` service on `listener` until `shutdown` resolves.
///
/// In-flight calls are drained before this returns; `timeout` bounds every call.
///
/// # Errors
/// Returns an error if the transport fails.
pub async fn serve<F>(
    listener: TcpListener,
    auth: Arc<AuthService>,
    gate: Gate,
    timeout: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let layer = ServiceBuilder::new()
        .layer(TraceLayer::new_for_grpc().make_span_with(RequestSpan))
        .layer(AdmissionLayer::new(gate))
        .into_inner();

    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    Server::builder()
        .timeout(timeout)
        .layer(layer)
        .add_service(AuthServer::new(AuthHandler::new(auth)))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .context("gRPC server failed")?;

    info!("gRPC server stopped");

    Ok(())
}
