use crate::aws::{LogInsightsClient, StackResourceClient};
use crate::config::{TargetGroup, UsageSyncConfig};
use crate::error::{UsageSyncError, UsageSyncResult};
use crate::locator::{ResourceLocator, component_map};
use crate::publisher::{PublishOutcome, TelemetryPublisher};
use crate::query::{QueryExecutor, QueryOutcome, QueryStatus, TimeWindow};
use crate::transform::{MetricType, transform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Invocations,
    CapacityUnits,
    All
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invocations => "invocations",
            Self::CapacityUnits => "capacity-units",
            Self::All => "all"
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub target_group: String,
    pub sources: Vec<String>,
    pub query_status: QueryStatus,
    pub rows: usize,
    pub records: usize,
    pub outcome: PublishOutcome
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job: JobKind,
    pub window: TimeWindow,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deliveries: Vec<DeliveryReport>
}

impl JobReport {
    pub fn new(job: JobKind, window: TimeWindow) -> Self {
        Self {
            job,
            window,
            started_at: Utc::now(),
            completed_at: None,
            deliveries: Vec::new()
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// False when the ingestion endpoint answered any batch with a non-2xx status.
    pub fn all_delivered(&self) -> bool {
        self.deliveries.iter().all(|d| d.outcome.is_success())
    }

    pub fn records_published(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| !d.outcome.is_skipped())
            .map(|d| d.records)
            .sum()
    }
}

/// Runs the aggregation jobs. Every run recomputes its whole lookback window;
/// nothing is carried between runs.
pub struct AggregationService {
    config: UsageSyncConfig,
    locator: ResourceLocator,
    executor: QueryExecutor,
    publisher: TelemetryPublisher
}

impl AggregationService {
    pub fn new(
        config: UsageSyncConfig,
        stack: Arc<dyn StackResourceClient>,
        logs: Arc<dyn LogInsightsClient>
    ) -> UsageSyncResult<Self> {
        config.validate()?;

        let locator = ResourceLocator::new(
            stack,
            logs.clone(),
            config.stack_name.clone(),
            config.log_group_prefix.clone()
        );
        let executor =
            QueryExecutor::new(logs, config.poll_interval()).with_max_wait(config.max_query_wait());
        let publisher = TelemetryPublisher::new(
            config.telemetry_endpoint.clone(),
            config.api_key.clone(),
            config.request_timeout()
        )?;

        Ok(Self {
            config,
            locator,
            executor,
            publisher
        })
    }

    pub fn config(&self) -> &UsageSyncConfig {
        &self.config
    }

    pub async fn aggregate_invocations(&self) -> UsageSyncResult<JobReport> {
        self.aggregate_at(JobKind::Invocations, Utc::now()).await
    }

    pub async fn aggregate_capacity_units(&self) -> UsageSyncResult<JobReport> {
        self.aggregate_at(JobKind::CapacityUnits, Utc::now()).await
    }

    /// Runs `job`; `All` runs invocations then capacity units and stops at the first error.
    pub async fn run(&self, job: JobKind) -> UsageSyncResult<Vec<JobReport>> {
        match job {
            JobKind::Invocations => Ok(vec![self.aggregate_invocations().await?]),
            JobKind::CapacityUnits => Ok(vec![self.aggregate_capacity_units().await?]),
            JobKind::All => {
                let invocations = self.aggregate_invocations().await?;
                let capacity_units = self.aggregate_capacity_units().await?;
                Ok(vec![invocations, capacity_units])
            }
        }
    }

    /// Runs a single job over the lookback window ending at `now`.
    #[tracing::instrument(skip(self), fields(lookback_hours = self.config.lookback_hours))]
    pub async fn aggregate_at(&self, job: JobKind, now: DateTime<Utc>) -> UsageSyncResult<JobReport> {
        let (metric, groups) = match job {
            JobKind::Invocations => (MetricType::InvocationCount, &self.config.invocation_groups),
            JobKind::CapacityUnits => (MetricType::CapacityUnits, &self.config.capacity_groups),
            JobKind::All => {
                return Err(UsageSyncError::Config(
                    "`all` is not a single job; use run()".to_string()
                ));
            }
        };

        let window = TimeWindow::trailing(now, self.config.lookback_hours)?;
        let mut report = JobReport::new(job, window);
        info!(%job, start = %window.start, end = %window.end, "Starting aggregation");

        let resolved = self.locator.resolve(&component_map(groups)).await?;

        let mut queried: Vec<(&TargetGroup, Vec<String>, QueryOutcome)> =
            Vec::with_capacity(groups.len());
        for group in groups {
            let sources = resolved.get(&group.name).cloned().unwrap_or_default();
            let outcome = self.executor.run(&sources, &group.query, &window).await?;
            if !outcome.status.is_complete() {
                warn!(
                    group = %group.name,
                    query_id = %outcome.query_id,
                    status = %outcome.status,
                    "Query ended without completing"
                );
            }
            queried.push((group, sources, outcome));
        }

        for (group, sources, outcome) in queried {
            let batch = transform(Some(metric), &outcome.rows)?;
            let delivery = self.publisher.publish(&batch).await?;
            report.deliveries.push(DeliveryReport {
                target_group: group.name.clone(),
                sources,
                query_status: outcome.status,
                rows: outcome.rows.len(),
                records: batch.len(),
                outcome: delivery
            });
        }

        report.complete();
        info!(
            %job,
            deliveries = report.deliveries.len(),
            records = report.records_published(),
            all_delivered = report.all_delivered(),
            "Aggregation completed"
        );

        Ok(report)
    }
}
