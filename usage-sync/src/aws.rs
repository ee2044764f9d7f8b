use crate::error::{UsageSyncError, UsageSyncResult};
use crate::query::{QueryRequest, QueryResults, QueryStatus, ResultField, ResultRow};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs::error::DisplayErrorContext;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Paged listing of the resources deployed by a stack.
#[async_trait]
pub trait StackResourceClient: Send + Sync {
    async fn list_stack_resources(
        &self,
        stack_name: &str,
        next_token: Option<&str>
    ) -> UsageSyncResult<StackResourcePage>;
}

/// The slice of the log store this crate talks to.
#[async_trait]
pub trait LogInsightsClient: Send + Sync {
    /// True when the first describe page for `log_group_name` as a prefix is non-empty.
    async fn log_group_exists(&self, log_group_name: &str) -> UsageSyncResult<bool>;
    async fn start_query(&self, request: &QueryRequest) -> UsageSyncResult<String>;
    async fn get_query_results(&self, query_id: &str) -> UsageSyncResult<QueryResults>;
    async fn stop_query(&self, query_id: &str) -> UsageSyncResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackResource {
    pub logical_id: String,
    pub physical_id: Option<String>
}

impl StackResource {
    pub fn new(logical_id: &str, physical_id: &str) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            physical_id: Some(physical_id.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackResourcePage {
    pub resources: Vec<StackResource>,
    pub next_page_token: Option<String>
}

pub async fn load_sdk_config() -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await
}

pub struct CloudFormationResources {
    client: aws_sdk_cloudformation::Client
}

impl CloudFormationResources {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudformation::Client::new(config)
        }
    }
}

#[async_trait]
impl StackResourceClient for CloudFormationResources {
    async fn list_stack_resources(
        &self,
        stack_name: &str,
        next_token: Option<&str>
    ) -> UsageSyncResult<StackResourcePage> {
        debug!(stack_name, "Listing stack resources");

        let output = self
            .client
            .list_stack_resources()
            .stack_name(stack_name)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| UsageSyncError::StackResources(DisplayErrorContext(&e).to_string()))?;

        let resources = output
            .stack_resource_summaries()
            .iter()
            .filter_map(|summary| {
                let logical_id: Option<&str> = summary.logical_resource_id().into();
                let physical_id: Option<&str> = summary.physical_resource_id().into();
                Some(StackResource {
                    logical_id: logical_id?.to_string(),
                    physical_id: physical_id.map(str::to_string)
                })
            })
            .collect();

        Ok(StackResourcePage {
            resources,
            next_page_token: output.next_token().map(str::to_string)
        })
    }
}

pub struct CloudWatchLogsInsights {
    client: aws_sdk_cloudwatchlogs::Client
}

impl CloudWatchLogsInsights {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(config)
        }
    }
}

#[async_trait]
impl LogInsightsClient for CloudWatchLogsInsights {
    async fn log_group_exists(&self, log_group_name: &str) -> UsageSyncResult<bool> {
        let output = self
            .client
            .describe_log_groups()
            .log_group_name_prefix(log_group_name)
            .send()
            .await
            .map_err(|e| {
                UsageSyncError::log_insights("DescribeLogGroups", DisplayErrorContext(&e))
            })?;

        Ok(!output.log_groups().is_empty())
    }

    async fn start_query(&self, request: &QueryRequest) -> UsageSyncResult<String> {
        let output = self
            .client
            .start_query()
            .set_log_group_names(Some(request.sources.clone()))
            .start_time(request.window.start_epoch())
            .end_time(request.window.end_epoch())
            .query_string(&request.query)
            .send()
            .await
            .map_err(|e| UsageSyncError::log_insights("StartQuery", DisplayErrorContext(&e)))?;

        output
            .query_id()
            .map(str::to_string)
            .ok_or_else(|| UsageSyncError::log_insights("StartQuery", "no query id returned"))
    }

    async fn get_query_results(&self, query_id: &str) -> UsageSyncResult<QueryResults> {
        let output = self
            .client
            .get_query_results()
            .query_id(query_id)
            .send()
            .await
            .map_err(|e| {
                UsageSyncError::log_insights("GetQueryResults", DisplayErrorContext(&e))
            })?;

        let status = output
            .status()
            .map(|s| QueryStatus::parse(s.as_str()))
            .unwrap_or_else(|| QueryStatus::Unknown(String::new()));

        let rows = output
            .results()
            .iter()
            .map(|row| {
                ResultRow::new(
                    row.iter()
                        .map(|f| ResultField {
                            field: f.field().unwrap_or_default().to_string(),
                            value: f.value().unwrap_or_default().to_string()
                        })
                        .collect()
                )
            })
            .collect();

        Ok(QueryResults { status, rows })
    }

    async fn stop_query(&self, query_id: &str) -> UsageSyncResult<()> {
        self.client
            .stop_query()
            .query_id(query_id)
            .send()
            .await
            .map_err(|e| UsageSyncError::log_insights("StopQuery", DisplayErrorContext(&e)))?;
        Ok(())
    }
}
