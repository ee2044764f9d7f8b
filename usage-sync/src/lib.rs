//! # Usage Sync
//!
//! Aggregates per-tenant usage of the pooled services from CloudWatch Logs
//! Insights and reports it to the CloudZero unit-cost telemetry API.
//!
//! ```text
//! ┌────────────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ CloudFormation │──►│ Logs Insights│──►│  transform  │──►│ CloudZero │
//! │ (log groups)   │   │ (poll query) │   │ (records)   │   │ (POST)    │
//! └────────────────┘   └──────────────┘   └─────────────┘   └───────────┘
//! ```
//!
//! Two jobs exist: daily Lambda invocation counts per tenant, and DynamoDB
//! capacity units per tenant inferred from product and order events.

pub mod aws;
pub mod config;
pub mod error;
pub mod jobs;
pub mod locator;
pub mod publisher;
pub mod queries;
pub mod query;
pub mod runner;
pub mod transform;

pub use config::{TargetGroup, UsageSyncConfig};
pub use error::{UsageSyncError, UsageSyncResult};
pub use jobs::{AggregationService, DeliveryReport, JobKind, JobReport};
pub use locator::{ResourceLocator, component_map};
pub use publisher::{PublishOutcome, TelemetryPublisher};
pub use query::{QueryExecutor, QueryOutcome, QueryStatus, ResultRow, TimeWindow};
pub use transform::{MetricType, TelemetryBatch, TelemetryRecord, transform};
