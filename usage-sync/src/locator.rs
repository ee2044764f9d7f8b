use crate::aws::{LogInsightsClient, StackResource, StackResourceClient};
use crate::config::TargetGroup;
use crate::error::UsageSyncResult;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maps a logical component id to the name of the target group it feeds.
pub type ComponentMap = HashMap<String, String>;

/// Log group names per target group, in the order the stack listing returned them.
pub type ResolvedSources = BTreeMap<String, Vec<String>>;

/// Builds the lookup for `groups`. A component listed in two groups belongs
/// to the first.
pub fn component_map(groups: &[TargetGroup]) -> ComponentMap {
    let mut map = ComponentMap::new();
    for group in groups {
        for component in &group.components {
            map.entry(component.clone())
                .or_insert_with(|| group.name.clone());
        }
    }
    map
}

pub struct ResourceLocator {
    stack: Arc<dyn StackResourceClient>,
    logs: Arc<dyn LogInsightsClient>,
    stack_name: String,
    log_group_prefix: String
}

impl ResourceLocator {
    pub fn new(
        stack: Arc<dyn StackResourceClient>,
        logs: Arc<dyn LogInsightsClient>,
        stack_name: impl Into<String>,
        log_group_prefix: impl Into<String>
    ) -> Self {
        Self {
            stack,
            logs,
            stack_name: stack_name.into(),
            log_group_prefix: log_group_prefix.into()
        }
    }

    pub fn log_group_name(&self, physical_id: &str) -> String {
        format!("{}{}", self.log_group_prefix, physical_id)
    }

    /// Resolves every target group in `components` to the log groups that
    /// actually exist. Groups with nothing deployed come back empty rather
    /// than as an error.
    pub async fn resolve(&self, components: &ComponentMap) -> UsageSyncResult<ResolvedSources> {
        let mut resolved: ResolvedSources = components
            .values()
            .map(|group| (group.clone(), Vec::new()))
            .collect();

        for resource in self.fetch_all_resources().await? {
            let Some(group) = components.get(&resource.logical_id) else {
                continue;
            };
            let Some(physical_id) = resource.physical_id.as_deref() else {
                debug!(logical_id = %resource.logical_id, "Resource has no physical id yet, skipping");
                continue;
            };

            let log_group = self.log_group_name(physical_id);
            if self.logs.log_group_exists(&log_group).await? {
                debug!(logical_id = %resource.logical_id, log_group = %log_group, group = %group, "Resolved log group");
                resolved.entry(group.clone()).or_default().push(log_group);
            } else {
                warn!(logical_id = %resource.logical_id, log_group = %log_group, "Log group does not exist, skipping");
            }
        }

        for (group, sources) in &resolved {
            if sources.is_empty() {
                warn!(group = %group, "No log groups found for target group");
            }
        }
        info!(
            stack_name = %self.stack_name,
            groups = resolved.len(),
            sources = resolved.values().map(Vec::len).sum::<usize>(),
            "Resolved log sources"
        );

        Ok(resolved)
    }

    async fn fetch_all_resources(&self) -> UsageSyncResult<Vec<StackResource>> {
        let mut all_resources = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .stack
                .list_stack_resources(&self.stack_name, page_token.as_deref())
                .await?;
            all_resources.extend(page.resources);
            page_token = page.next_page_token;

            if page_token.is_none() {
                break;
            }
        }

        Ok(all_resources)
    }
}
