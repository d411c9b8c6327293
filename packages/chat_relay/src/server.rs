use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use chatgpt_client::ChatBackend;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::handler::handle_socket;
use crate::metrics::RelayMetrics;

/// Shared by every connection. The backend is immutable once the relay starts.
pub struct AppState<B> {
    pub backend: Arc<B>,
    pub metrics: Arc<RelayMetrics>,
    /// Bound on each upstream call made for a frame
    pub call_timeout: Option<Duration>,
    pub send_channel_capacity: usize,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            metrics: self.metrics.clone(),
            call_timeout: self.call_timeout,
            send_channel_capacity: self.send_channel_capacity,
        }
    }
}

impl<B: ChatBackend> AppState<B> {
    pub fn new(
        backend: Arc<B>,
        metrics: Arc<RelayMetrics>,
        server: &ServerConfig,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            backend,
            metrics,
            call_timeout,
            send_channel_capacity: server.send_channel_capacity,
        }
    }
}

/// Span per upgrade request, tagged with a request id.
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<Body> MakeSpan<Body> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<Body>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

/// Every path upgrades to the relay protocol.
pub fn build_router<B: ChatBackend>(state: AppState<B>) -> Router {
    Router::new()
        .fallback(ws_handler::<B>)
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .with_state(state)
}

async fn ws_handler<B: ChatBackend>(
    State(state): State<AppState<B>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serve `router` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
