use crate::error::{UsageSyncError, UsageSyncResult};
use crate::queries::{INVOCATION_QUERY, ORDER_CAPACITY_QUERY, PRODUCT_CAPACITY_QUERY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const LOOKBACK_HOURS_ENV: &str = "NUMBER_OF_HOURS";
pub const API_KEY_ENV: &str = "CLOUDZERO_API_KEY";
pub const STACK_NAME_ENV: &str = "STACK_NAME";
pub const TELEMETRY_ENDPOINT_ENV: &str = "TELEMETRY_ENDPOINT";
pub const MAX_QUERY_WAIT_ENV: &str = "MAX_QUERY_WAIT_SECONDS";

pub const DEFAULT_TELEMETRY_ENDPOINT: &str = "https://api.cloudzero.com/unit-cost/v1/telemetry";

/// Log sources of the listed components are queried together with `query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub name: String,
    pub components: Vec<String>,
    pub query: String
}

impl TargetGroup {
    pub fn new(name: &str, components: &[&str], query: &str) -> Self {
        Self {
            name: name.to_string(),
            components: components.iter().map(|c| (*c).to_string()).collect(),
            query: query.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSyncConfig {
    pub lookback_hours: u32,
    pub api_key: String,
    #[serde(default = "default_stack_name")]
    pub stack_name: String,
    #[serde(default = "default_log_group_prefix")]
    pub log_group_prefix: String,
    #[serde(default = "default_telemetry_endpoint")]
    pub telemetry_endpoint: String,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// `None` polls until the log store reports a terminal status.
    #[serde(default)]
    pub max_query_wait_seconds: Option<u64>,
    #[serde(default = "default_invocation_groups")]
    pub invocation_groups: Vec<TargetGroup>,
    #[serde(default = "default_capacity_groups")]
    pub capacity_groups: Vec<TargetGroup>
}

fn default_stack_name() -> String {
    "stack-pooled".to_string()
}

fn default_log_group_prefix() -> String {
    "/aws/lambda/".to_string()
}

fn default_telemetry_endpoint() -> String {
    DEFAULT_TELEMETRY_ENDPOINT.to_string()
}

fn default_request_timeout_seconds() -> u64 {
    5
}

fn default_poll_interval_seconds() -> u64 {
    5
}

pub fn default_invocation_groups() -> Vec<TargetGroup> {
    vec![TargetGroup::new(
        "pooled-functions",
        &[
            "CreateOrderFunction",
            "CreateProductFunction",
            "GetOrdersFunction",
            "GetProductsFunction"
        ],
        INVOCATION_QUERY
    )]
}

pub fn default_capacity_groups() -> Vec<TargetGroup> {
    vec![
        TargetGroup::new(
            "product-service",
            &[
                "CreateProductFunction",
                "UpdateProductFunction",
                "GetProductsFunction"
            ],
            PRODUCT_CAPACITY_QUERY
        ),
        TargetGroup::new(
            "order-service",
            &[
                "CreateOrderFunction",
                "UpdateOrderFunction",
                "GetOrdersFunction"
            ],
            ORDER_CAPACITY_QUERY
        ),
    ]
}

impl Default for UsageSyncConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            api_key: String::new(),
            stack_name: default_stack_name(),
            log_group_prefix: default_log_group_prefix(),
            telemetry_endpoint: default_telemetry_endpoint(),
            request_timeout_seconds: default_request_timeout_seconds(),
            poll_interval_seconds: default_poll_interval_seconds(),
            max_query_wait_seconds: None,
            invocation_groups: default_invocation_groups(),
            capacity_groups: default_capacity_groups()
        }
    }
}

impl UsageSyncConfig {
    /// Loads the configuration from the process environment.
    ///
    /// `NUMBER_OF_HOURS` and `CLOUDZERO_API_KEY` are required.
    pub fn from_env() -> UsageSyncResult<Self> {
        let lookback_hours = std::env::var(LOOKBACK_HOURS_ENV)
            .map_err(|_| UsageSyncError::Config(format!("{LOOKBACK_HOURS_ENV} not set")))?;
        let lookback_hours = lookback_hours.trim().parse::<u32>().map_err(|e| {
            UsageSyncError::Config(format!(
                "{LOOKBACK_HOURS_ENV} must be a whole number of hours, got {lookback_hours:?}: {e}"
            ))
        })?;

        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| UsageSyncError::Config(format!("{API_KEY_ENV} not set")))?;

        let max_query_wait_seconds = match std::env::var(MAX_QUERY_WAIT_ENV) {
            Ok(value) => Some(value.trim().parse::<u64>().map_err(|e| {
                UsageSyncError::Config(format!("{MAX_QUERY_WAIT_ENV} is not a number: {e}"))
            })?),
            Err(_) => None
        };

        let mut builder = Self::builder()
            .lookback_hours(lookback_hours)
            .api_key(api_key);
        if let Ok(stack_name) = std::env::var(STACK_NAME_ENV) {
            builder = builder.stack_name(stack_name);
        }
        if let Ok(endpoint) = std::env::var(TELEMETRY_ENDPOINT_ENV) {
            builder = builder.telemetry_endpoint(endpoint);
        }
        if let Some(seconds) = max_query_wait_seconds {
            builder = builder.max_query_wait_seconds(seconds);
        }

        builder.build()
    }

    #[must_use]
    pub fn builder() -> UsageSyncConfigBuilder {
        UsageSyncConfigBuilder::default()
    }

    pub fn validate(&self) -> UsageSyncResult<()> {
        if self.lookback_hours == 0 {
            return Err(UsageSyncError::Config(
                "lookback_hours must be at least 1".to_string()
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(UsageSyncError::Config("api_key must not be empty".to_string()));
        }
        if self.poll_interval_seconds == 0 {
            return Err(UsageSyncError::Config(
                "poll_interval_seconds must be at least 1".to_string()
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(UsageSyncError::Config(
                "request_timeout_seconds must be at least 1".to_string()
            ));
        }
        if self.telemetry_endpoint.trim().is_empty() {
            return Err(UsageSyncError::Config(
                "telemetry_endpoint must not be empty".to_string()
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn max_query_wait(&self) -> Option<Duration> {
        self.max_query_wait_seconds.map(Duration::from_secs)
    }
}

#[derive(Default)]
pub struct UsageSyncConfigBuilder {
    lookback_hours: Option<u32>,
    api_key: Option<String>,
    stack_name: Option<String>,
    log_group_prefix: Option<String>,
    telemetry_endpoint: Option<String>,
    request_timeout_seconds: Option<u64>,
    poll_interval_seconds: Option<u64>,
    max_query_wait_seconds: Option<u64>,
    invocation_groups: Option<Vec<TargetGroup>>,
    capacity_groups: Option<Vec<TargetGroup>>
}

impl UsageSyncConfigBuilder {
    #[must_use]
    pub fn lookback_hours(mut self, hours: u32) -> Self {
        self.lookback_hours = Some(hours);
        self
    }

    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn stack_name(mut self, name: impl Into<String>) -> Self {
        self.stack_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn log_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_group_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn telemetry_endpoint(mut self, url: impl Into<String>) -> Self {
        self.telemetry_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn request_timeout_seconds(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn max_query_wait_seconds(mut self, seconds: u64) -> Self {
        self.max_query_wait_seconds = Some(seconds);
        self
    }

    #[must_use]
    pub fn invocation_groups(mut self, groups: Vec<TargetGroup>) -> Self {
        self.invocation_groups = Some(groups);
        self
    }

    #[must_use]
    pub fn capacity_groups(mut self, groups: Vec<TargetGroup>) -> Self {
        self.capacity_groups = Some(groups);
        self
    }

    pub fn build(self) -> UsageSyncResult<UsageSyncConfig> {
        let lookback_hours = self
            .lookback_hours
            .ok_or_else(|| UsageSyncError::Config("lookback_hours is required".to_string()))?;
        let api_key = self
            .api_key
            .ok_or_else(|| UsageSyncError::Config("api_key is required".to_string()))?;

        let config = UsageSyncConfig {
            lookback_hours,
            api_key,
            stack_name: self.stack_name.unwrap_or_else(default_stack_name),
            log_group_prefix: self
                .log_group_prefix
                .unwrap_or_else(default_log_group_prefix),
            telemetry_endpoint: self
                .telemetry_endpoint
                .unwrap_or_else(default_telemetry_endpoint),
            request_timeout_seconds: self
                .request_timeout_seconds
                .unwrap_or_else(default_request_timeout_seconds),
            poll_interval_seconds: self
                .poll_interval_seconds
                .unwrap_or_else(default_poll_interval_seconds),
            max_query_wait_seconds: self.max_query_wait_seconds,
            invocation_groups: self
                .invocation_groups
                .unwrap_or_else(default_invocation_groups),
            capacity_groups: self.capacity_groups.unwrap_or_else(default_capacity_groups)
        };
        config.validate()?;
        Ok(config)
    }
}
