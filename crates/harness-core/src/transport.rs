use axum::http::StatusCode;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::CLIENT_HEADER;
use crate::error::{HarnessError, Result};
use crate::stats::StatsSnapshot;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How clients and supervisors reach the request handler.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Issue one mutating request as `client`, returning the response status.
    fn submit<'a>(&'a self, client: &'a str) -> BoxFuture<'a, Result<StatusCode>>;

    /// Probe the liveness endpoint on behalf of `actor`.
    fn health<'a>(&'a self, actor: &'a str) -> BoxFuture<'a, Result<StatusCode>>;

    /// Fetch the current stats snapshot.
    fn stats(&self) -> BoxFuture<'_, Result<StatsSnapshot>>;
}

/// reqwest-backed transport against a running server.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Drain the body so the connection returns to the pool. A failed
    /// drain is logged; the status was already received.
    async fn release(actor: &str, response: reqwest::Response) -> StatusCode {
        let status = response.status();
        if let Err(e) = response.bytes().await {
            warn!(actor, "Error closing response body: {}", e);
        }
        status
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn submit<'a>(&'a self, client: &'a str) -> BoxFuture<'a, Result<StatusCode>> {
        Box::pin(async move {
            let response = self
                .client
                .post(format!("{}/", self.base_url))
                .header(CLIENT_HEADER, client)
                .send()
                .await?;
            Ok(Self::release(client, response).await)
        })
    }

    fn health<'a>(&'a self, actor: &'a str) -> BoxFuture<'a, Result<StatusCode>> {
        Box::pin(async move {
            let response = self
                .client
                .get(format!("{}/health", self.base_url))
                .send()
                .await?;
            Ok(Self::release(actor, response).await)
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<StatsSnapshot>> {
        Box::pin(async move {
            let snapshot = self
                .client
                .get(format!("{}/stats", self.base_url))
                .send()
                .await?
                .error_for_status()?
                .json::<StatsSnapshot>()
                .await?;
            Ok(snapshot)
        })
    }
}

/// Scripted reply for [`MockTransport`].
#[derive(Debug, Clone, Copy)]
pub enum MockReply {
    Status(StatusCode),
    /// Fails the call the way an unreachable server would
    Unavailable,
}

/// In-process transport for tests: replies are popped from a script,
/// falling back to `200 OK` once it runs dry.
pub struct MockTransport {
    delay: Duration,
    submit_replies: Mutex<VecDeque<MockReply>>,
    health_replies: Mutex<VecDeque<MockReply>>,
    submitted: Mutex<Vec<String>>,
    health_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            submit_replies: Mutex::new(VecDeque::new()),
            health_replies: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            health_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_submit_replies(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        lock(&self.submit_replies).extend(replies);
        self
    }

    pub fn with_health_replies(self, replies: impl IntoIterator<Item = MockReply>) -> Self {
        lock(&self.health_replies).extend(replies);
        self
    }

    /// Client names in the order their requests were issued.
    pub fn submitted(&self) -> Vec<String> {
        lock(&self.submitted).clone()
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently outstanding submits observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply(script: &Mutex<VecDeque<MockReply>>) -> Result<StatusCode> {
        match lock(script).pop_front() {
            Some(MockReply::Status(status)) => Ok(status),
            Some(MockReply::Unavailable) => {
                Err(HarnessError::Unavailable("mock transport".to_string()))
            }
            None => Ok(StatusCode::OK),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn submit<'a>(&'a self, client: &'a str) -> BoxFuture<'a, Result<StatusCode>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            lock(&self.submitted).push(client.to_string());

            sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Self::reply(&self.submit_replies)
        })
    }

    fn health<'a>(&'a self, _actor: &'a str) -> BoxFuture<'a, Result<StatusCode>> {
        Box::pin(async move {
            self.health_calls.fetch_add(1, Ordering::SeqCst);
            Self::reply(&self.health_replies)
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<StatsSnapshot>> {
        Box::pin(async move { Ok(StatsSnapshot::default()) })
    }
}
