//! Logs Insights query execution.
//!
//! A query is submitted once and then polled at a fixed interval until the
//! log store reports anything other than `Scheduled` or `Running`. The last
//! observed payload is returned as-is; callers decide what a `Failed` or
//! `Timeout` status means for them.
//!
//! Without a deadline or a cancellation channel the loop is unbounded, which
//! leaves the wait to the log store's own query timeout.

use crate::aws::LogInsightsClient;
use crate::error::{UsageSyncError, UsageSyncResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Half-open `[start, end)` interval over which logs are queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> UsageSyncResult<Self> {
        if start >= end {
            return Err(UsageSyncError::InvalidWindow {
                start: start.timestamp(),
                end: end.timestamp()
            });
        }
        Ok(Self { start, end })
    }

    /// The `hours` leading up to `now`.
    pub fn trailing(now: DateTime<Utc>, hours: u32) -> UsageSyncResult<Self> {
        Self::new(now - ChronoDuration::hours(i64::from(hours)), now)
    }

    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_epoch(&self) -> i64 {
        self.end.timestamp()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
    Unknown(String)
}

impl QueryStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Scheduled" => Self::Scheduled,
            "Running" => Self::Running,
            "Complete" => Self::Complete,
            "Failed" => Self::Failed,
            "Cancelled" => Self::Cancelled,
            "Timeout" => Self::Timeout,
            other => Self::Unknown(other.to_string())
        }
    }

    /// Scheduled and running queries keep the poll loop going; every other
    /// status, including ones this crate does not know, ends it.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Running)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Running => "Running",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::Timeout => "Timeout",
            Self::Unknown(status) => status
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultField {
    pub field: String,
    pub value: String
}

/// One row of a query result. Field order follows the query's projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub fields: Vec<ResultField>
}

impl ResultRow {
    pub fn new(fields: Vec<ResultField>) -> Self {
        Self { fields }
    }

    pub fn from_pairs<K: ToString, V: ToString>(pairs: &[(K, V)]) -> Self {
        Self {
            fields: pairs
                .iter()
                .map(|(field, value)| ResultField {
                    field: field.to_string(),
                    value: value.to_string()
                })
                .collect()
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub sources: Vec<String>,
    pub query: String,
    pub window: TimeWindow
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResults {
    pub status: QueryStatus,
    pub rows: Vec<ResultRow>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub query_id: String,
    pub status: QueryStatus,
    pub rows: Vec<ResultRow>,
    /// Wait-then-recheck cycles after the first status read.
    pub polls: u32
}

enum Wake {
    Elapsed,
    Cancelled,
    SenderDropped
}

pub struct QueryExecutor {
    client: Arc<dyn LogInsightsClient>,
    poll_interval: Duration,
    max_wait: Option<Duration>
}

impl QueryExecutor {
    pub fn new(client: Arc<dyn LogInsightsClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            max_wait: None
        }
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Runs `query` over `sources` and waits for a terminal status.
    ///
    /// An empty `sources` list is submitted like any other.
    pub async fn run(
        &self,
        sources: &[String],
        query: &str,
        window: &TimeWindow
    ) -> UsageSyncResult<QueryOutcome> {
        self.execute(sources, query, window, None).await
    }

    /// Like [`run`](Self::run), but stops the query once `cancel` turns `true`.
    pub async fn run_cancellable(
        &self,
        sources: &[String],
        query: &str,
        window: &TimeWindow,
        cancel: watch::Receiver<bool>
    ) -> UsageSyncResult<QueryOutcome> {
        self.execute(sources, query, window, Some(cancel)).await
    }

    async fn execute(
        &self,
        sources: &[String],
        query: &str,
        window: &TimeWindow,
        mut cancel: Option<watch::Receiver<bool>>
    ) -> UsageSyncResult<QueryOutcome> {
        let request = QueryRequest {
            sources: sources.to_vec(),
            query: query.to_string(),
            window: *window
        };

        let query_id = self.client.start_query(&request).await?;
        metrics::counter!("usage_sync.queries.submitted").increment(1);
        debug!(
            query_id = %query_id,
            sources = request.sources.len(),
            start = request.window.start_epoch(),
            end = request.window.end_epoch(),
            "Submitted Logs Insights query"
        );

        let started = Instant::now();
        let mut results = self.client.get_query_results(&query_id).await?;
        let mut polls = 0u32;

        while results.status.is_pending() {
            let mut delay = self.poll_interval;
            if let Some(max_wait) = self.max_wait {
                let waited = started.elapsed();
                if waited >= max_wait {
                    self.stop(&query_id).await;
                    return Err(UsageSyncError::QueryDeadlineExceeded {
                        query_id,
                        status: results.status.to_string(),
                        waited_seconds: waited.as_secs()
                    });
                }
                delay = delay.min(max_wait - waited);
            }

            match self.pause(delay, cancel.as_mut()).await {
                Wake::Elapsed => {}
                Wake::Cancelled => {
                    self.stop(&query_id).await;
                    return Err(UsageSyncError::QueryCancelled {
                        query_id,
                        status: results.status.to_string()
                    });
                }
                Wake::SenderDropped => cancel = None
            }

            results = self.client.get_query_results(&query_id).await?;
            polls += 1;
            metrics::counter!("usage_sync.query.polls").increment(1);
            debug!(query_id = %query_id, status = %results.status, polls, "Polled query status");
        }

        info!(
            query_id = %query_id,
            status = %results.status,
            rows = results.rows.len(),
            polls,
            "Query reached terminal status"
        );

        Ok(QueryOutcome {
            query_id,
            status: results.status,
            rows: results.rows,
            polls
        })
    }

    async fn pause(&self, delay: Duration, cancel: Option<&mut watch::Receiver<bool>>) -> Wake {
        let Some(rx) = cancel else {
            tokio::time::sleep(delay).await;
            return Wake::Elapsed;
        };

        if *rx.borrow_and_update() {
            return Wake::Cancelled;
        }

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return Wake::Elapsed,
                changed = rx.changed() => {
                    if changed.is_err() {
                        (&mut sleep).await;
                        return Wake::SenderDropped;
                    }
                    if *rx.borrow_and_update() {
                        return Wake::Cancelled;
                    }
                }
            }
        }
    }

    async fn stop(&self, query_id: &str) {
        if let Err(e) = self.client.stop_query(query_id).await {
            warn!(query_id = %query_id, error = %e, "Failed to stop abandoned query");
        }
    }
}
