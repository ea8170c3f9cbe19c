use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ALLOWED_CLIENTS, CLIENT_HEADER};
use crate::error::{HarnessError, Result};
use crate::outcome;
use crate::rate_limiter::RateLimiter;
use crate::stats::{StatsAggregate, StatsSnapshot};

#[derive(Clone)]
pub struct AppState {
    stats: Arc<StatsAggregate>,
    ingress: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(stats: Arc<StatsAggregate>, ingress: Arc<RateLimiter>) -> Self {
        Self { stats, ingress }
    }
}

/// Routes: `/` (rate limited, simulated outcomes), `/stats`, `/health`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            any(handle_request).layer(middleware::from_fn_with_state(
                state.clone(),
                ingress_limit,
            )),
        )
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Rejects over-limit requests with 429 instead of queueing them.
async fn ingress_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.ingress.allow() {
        debug!("ingress rate limit exceeded");
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    next.run(request).await
}

async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "Invalid Method").into_response();
    }

    let client = headers
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !ALLOWED_CLIENTS.contains(&client) {
        debug!(client, "rejected unknown client");
        return (
            StatusCode::FORBIDDEN,
            "Access denied: only client1 and client2 are allowed",
        )
            .into_response();
    }

    let outcome = outcome::generate(&mut rand::rng());
    state.stats.record_server(outcome.is_positive()).await;

    outcome.status().into_response()
}

async fn stats_handler(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot().await)
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// A server whose listener is already bound but not yet serving.
pub struct BoundServer {
    listener: TcpListener,
    app: Router,
}

impl BoundServer {
    pub async fn bind(addr: SocketAddr, app: Router) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HarnessError::Bind { addr, source })?;
        Ok(Self { listener, app })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(HarnessError::Serve)
    }

    /// Start serving until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> ServerHandle {
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let addr = self.listener.local_addr().map_err(HarnessError::Serve)?;
            info!("Server is running on http://{}", addr);
            let _ = ready_tx.send(addr);

            axum::serve(self.listener, self.app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(HarnessError::Serve)
        });

        ServerHandle {
            ready: Some(ready_rx),
            task,
        }
    }
}

pub struct ServerHandle {
    ready: Option<oneshot::Receiver<SocketAddr>>,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    /// Wait for the one-shot readiness signal.
    pub async fn ready(&mut self) -> Result<SocketAddr> {
        let rx = self.ready.take().ok_or(HarnessError::ServerNotReady)?;
        rx.await.map_err(|_| HarnessError::ServerNotReady)
    }

    pub async fn join(self) -> Result<()> {
        self.task.await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<StatsAggregate>) {
        let stats = Arc::new(StatsAggregate::new());
        let ingress = Arc::new(RateLimiter::with_capacity(5, 5));
        (router(AppState::new(stats.clone(), ingress)), stats)
    }

    fn post_as(client: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(CLIENT_HEADER, client)
            .body(Body::empty())
            .unwrap()
    }

    fn is_generated(status: StatusCode) -> bool {
        [
            StatusCode::OK,
            StatusCode::ACCEPTED,
            StatusCode::BAD_REQUEST,
            StatusCode::INTERNAL_SERVER_ERROR,
        ]
        .contains(&status)
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_client_forbidden_without_side_effects() {
        let (app, stats) = test_app();

        let response = app.oneshot(post_as("client3")).await.unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(stats.snapshot().await, StatsSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_rapid_request_is_rate_limited() {
        let (app, stats) = test_app();

        for _ in 0..5 {
            let response = app.clone().oneshot(post_as("client1")).await.unwrap();
            assert!(is_generated(response.status()), "got {}", response.status());
        }
        let response = app.clone().oneshot(post_as("client1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Only admitted requests reach the aggregate
        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.server.total(), 5);
        assert!(snapshot.clients.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_counts_match_generated_statuses() {
        let (app, stats) = test_app();
        let mut positive = 0;

        for _ in 0..5 {
            let status = app.clone().oneshot(post_as("client2")).await.unwrap().status();
            if status.is_success() {
                positive += 1;
            }
        }

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.server.positive, positive);
        assert_eq!(snapshot.server.negative, 5 - positive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_post_method_not_allowed() {
        let (app, stats) = test_app();
        let request = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/")
            .header(CLIENT_HEADER, "client1")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(stats.snapshot().await, StatsSnapshot::default());
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app();

        let get = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let post = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(post).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let (app, stats) = test_app();
        stats.record_server(true).await;
        stats
            .record_client("client1", StatusCode::INTERNAL_SERVER_ERROR)
            .await;

        let get = axum::http::Request::builder()
            .uri("/stats")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let snapshot: StatsSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot, stats.snapshot().await);

        let delete = axum::http::Request::builder()
            .method(Method::DELETE)
            .uri("/stats")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(delete).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_bound_server_signals_ready_and_shuts_down() {
        let (app, _) = test_app();
        let server = BoundServer::bind("127.0.0.1:0".parse().unwrap(), app)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let mut handle = server.spawn(shutdown.clone());
        assert_eq!(handle.ready().await.unwrap(), addr);

        shutdown.cancel();
        handle.join().await.unwrap();
    }
}
