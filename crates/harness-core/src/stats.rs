use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Favorable vs. unfavorable outcome counts. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub positive: u64,
    pub negative: u64,
}

impl Summary {
    pub fn total(&self) -> u64 {
        self.positive + self.negative
    }

    fn record(&mut self, positive: bool) {
        if positive {
            self.positive += 1;
        } else {
            self.negative += 1;
        }
    }
}

/// Point-in-time copy of the aggregate, also the `/stats` wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub server: Summary,
    pub clients: BTreeMap<String, Summary>,
}

impl StatsSnapshot {
    pub fn client_total(&self) -> u64 {
        self.clients.values().map(Summary::total).sum()
    }
}

/// How a status observed by a client is counted. Only the statuses the
/// handler generates count; rejections (403/405/429) never reach the
/// server totals, so they stay out of the client totals too.
pub fn classify(status: StatusCode) -> Option<bool> {
    match status {
        StatusCode::OK | StatusCode::ACCEPTED => Some(true),
        StatusCode::BAD_REQUEST | StatusCode::INTERNAL_SERVER_ERROR => Some(false),
        _ => None,
    }
}

/// Server-wide and per-client outcome counts behind a single lock.
///
/// Writers take the lock exclusively for one increment; readers share it,
/// so a snapshot never shows a partially applied update.
#[derive(Debug, Default)]
pub struct StatsAggregate {
    inner: RwLock<StatsSnapshot>,
}

impl StatsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome generated by the request handler.
    pub async fn record_server(&self, positive: bool) {
        self.inner.write().await.server.record(positive);
    }

    /// Record a response received by one of `client`'s workers. The client
    /// entry is created on first observation. Returns the classification.
    pub async fn record_client(&self, client: &str, status: StatusCode) -> Option<bool> {
        let positive = classify(status)?;
        let mut stats = self.inner.write().await;
        stats
            .clients
            .entry(client.to_string())
            .or_default()
            .record(positive);
        Some(positive)
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        self.inner.read().await.clone()
    }
}

/// Per-status response counts kept locally by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTally {
    counts: BTreeMap<u16, u64>,
}

impl StatusTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, status: StatusCode) {
        *self.counts.entry(status.as_u16()).or_default() += 1;
    }

    pub fn merge(&mut self, other: &StatusTally) {
        for (status, count) in &other.counts {
            *self.counts.entry(*status).or_default() += count;
        }
    }

    pub fn get(&self, status: u16) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Counts in ascending status order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u64)> + '_ {
        self.counts.iter().map(|(status, count)| (*status, *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_classify() {
        assert_eq!(classify(StatusCode::OK), Some(true));
        assert_eq!(classify(StatusCode::ACCEPTED), Some(true));
        assert_eq!(classify(StatusCode::BAD_REQUEST), Some(false));
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), Some(false));
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), None);
        assert_eq!(classify(StatusCode::FORBIDDEN), None);
        assert_eq!(classify(StatusCode::METHOD_NOT_ALLOWED), None);
        assert_eq!(classify(StatusCode::NO_CONTENT), None);
        assert_eq!(classify(StatusCode::MOVED_PERMANENTLY), None);
    }

    #[tokio::test]
    async fn test_client_entries_created_lazily() {
        let stats = StatsAggregate::new();
        assert!(stats.snapshot().await.clients.is_empty());

        stats.record_client("client1", StatusCode::OK).await;
        stats.record_client("client1", StatusCode::BAD_REQUEST).await;
        stats.record_client("client1", StatusCode::FOUND).await;
        stats
            .record_client("client1", StatusCode::TOO_MANY_REQUESTS)
            .await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.clients.len(), 1);
        assert_eq!(
            snapshot.clients["client1"],
            Summary {
                positive: 1,
                negative: 1
            }
        );
        assert_eq!(snapshot.server, Summary::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(StatsAggregate::new());
        let mut handles = Vec::new();

        for task in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                let client = if task % 2 == 0 { "client1" } else { "client2" };
                for i in 0..250 {
                    stats.record_server(i % 3 != 0).await;
                    stats.record_client(client, StatusCode::ACCEPTED).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.server.total(), 2000);
        assert_eq!(snapshot.client_total(), 2000);
        assert_eq!(snapshot.clients["client1"].positive, 1000);
        assert_eq!(snapshot.clients["client2"].positive, 1000);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut snapshot = StatsSnapshot::default();
        snapshot.server.positive = 3;
        snapshot.clients.insert(
            "client2".to_string(),
            Summary {
                positive: 1,
                negative: 2,
            },
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "server": {"positive": 3, "negative": 0},
                "clients": {"client2": {"positive": 1, "negative": 2}}
            })
        );
    }

    #[test]
    fn test_tally_merge() {
        let mut a = StatusTally::new();
        a.record(StatusCode::OK);
        a.record(StatusCode::OK);
        let mut b = StatusTally::new();
        b.record(StatusCode::OK);
        b.record(StatusCode::INTERNAL_SERVER_ERROR);

        a.merge(&b);
        assert_eq!(a.get(200), 3);
        assert_eq!(a.get(500), 1);
        assert_eq!(a.get(202), 0);
        assert_eq!(a.total(), 4);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![(200, 3), (500, 1)]);
    }
}
