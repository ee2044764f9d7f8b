use crate::error::{UsageSyncError, UsageSyncResult};
use crate::transform::TelemetryBatch;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The batch was empty and no request was made.
    Skipped,
    /// The endpoint answered; the status is not interpreted here.
    Delivered { status: u16, body: String }
}

impl PublishOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    /// Skipped batches count as successful.
    pub fn is_success(&self) -> bool {
        match self {
            Self::Skipped => true,
            Self::Delivered { status, .. } => (200..300).contains(status)
        }
    }
}

pub struct TelemetryPublisher {
    client: Client,
    endpoint: String,
    api_key: String
}

impl TelemetryPublisher {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration
    ) -> UsageSyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UsageSyncError::Http)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into()
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `batch` in a single POST. Transport failures, including the
    /// request timeout, are errors; any HTTP answer is returned as-is.
    pub async fn publish(&self, batch: &TelemetryBatch) -> UsageSyncResult<PublishOutcome> {
        if batch.is_empty() {
            info!("Telemetry batch is empty, nothing to send");
            metrics::counter!("usage_sync.publish.skipped").increment(1);
            return Ok(PublishOutcome::Skipped);
        }

        debug!(endpoint = %self.endpoint, records = batch.len(), "Posting telemetry records");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("Authorization", &self.api_key)
            .body(serde_json::to_vec(batch)?)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if (200..300).contains(&status) {
            metrics::counter!("usage_sync.records.published").increment(batch.len() as u64);
            info!(status, records = batch.len(), "Telemetry records delivered");
        } else {
            metrics::counter!("usage_sync.publish.rejected").increment(1);
            warn!(status, body = %body, records = batch.len(), "Telemetry endpoint rejected batch");
        }

        Ok(PublishOutcome::Delivered { status, body })
    }
}
