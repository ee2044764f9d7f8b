#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use usage_sync::aws::{LogInsightsClient, StackResource, StackResourceClient, StackResourcePage};
use usage_sync::query::{QueryRequest, QueryResults, QueryStatus, ResultRow};
use usage_sync::{UsageSyncError, UsageSyncResult};

/// Serves fixed pages of stack resources.
pub struct FakeStack {
    pages: Vec<Vec<StackResource>>,
    pub calls: Mutex<Vec<Option<String>>>
}

impl FakeStack {
    pub fn single_page(resources: Vec<StackResource>) -> Self {
        Self::paged(vec![resources])
    }

    pub fn paged(pages: Vec<Vec<StackResource>>) -> Self {
        Self {
            pages,
            calls: Mutex::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StackResourceClient for FakeStack {
    async fn list_stack_resources(
        &self,
        _stack_name: &str,
        next_token: Option<&str>
    ) -> UsageSyncResult<StackResourcePage> {
        self.calls
            .lock()
            .unwrap()
            .push(next_token.map(str::to_string));

        let index: usize = next_token.map_or(0, |t| t.parse().unwrap());
        let resources = self.pages.get(index).cloned().unwrap_or_default();
        let next_page_token = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(StackResourcePage {
            resources,
            next_page_token
        })
    }
}

/// Log store double. Each submitted query consumes the next script, a list of
/// results handed out one per status read; the last entry repeats.
#[derive(Default)]
pub struct FakeLogs {
    existing: HashSet<String>,
    scripts: Mutex<VecDeque<Vec<QueryResults>>>,
    active: Mutex<Vec<VecDeque<QueryResults>>>,
    fail_start: bool,
    pub exists_checks: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<QueryRequest>>,
    pub result_reads: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>
}

impl FakeLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_groups(mut self, names: &[&str]) -> Self {
        self.existing = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    pub fn with_script(self, script: Vec<QueryResults>) -> Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn submitted(&self) -> Vec<QueryRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn result_reads(&self) -> usize {
        self.result_reads.lock().unwrap().len()
    }
}

#[async_trait]
impl LogInsightsClient for FakeLogs {
    async fn log_group_exists(&self, log_group_name: &str) -> UsageSyncResult<bool> {
        self.exists_checks
            .lock()
            .unwrap()
            .push(log_group_name.to_string());
        Ok(self
            .existing
            .iter()
            .any(|name| name.starts_with(log_group_name)))
    }

    async fn start_query(&self, request: &QueryRequest) -> UsageSyncResult<String> {
        if self.fail_start {
            return Err(UsageSyncError::log_insights("StartQuery", "access denied"));
        }
        self.submitted.lock().unwrap().push(request.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![complete(vec![])]);
        let mut active = self.active.lock().unwrap();
        active.push(script.into());
        Ok(format!("q-{}", active.len() - 1))
    }

    async fn get_query_results(&self, query_id: &str) -> UsageSyncResult<QueryResults> {
        self.result_reads
            .lock()
            .unwrap()
            .push(query_id.to_string());

        let index: usize = query_id.trim_start_matches("q-").parse().unwrap();
        let mut active = self.active.lock().unwrap();
        let script = &mut active[index];
        let next = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        };
        Ok(next)
    }

    async fn stop_query(&self, query_id: &str) -> UsageSyncResult<()> {
        self.stopped.lock().unwrap().push(query_id.to_string());
        Ok(())
    }
}

pub fn status(status: QueryStatus) -> QueryResults {
    QueryResults {
        status,
        rows: vec![]
    }
}

pub fn complete(rows: Vec<ResultRow>) -> QueryResults {
    QueryResults {
        status: QueryStatus::Complete,
        rows
    }
}

pub fn invocation_row(tenant: &str, count: &str, timestamp: &str) -> ResultRow {
    ResultRow::from_pairs(&[
        ("TenantId", tenant),
        ("Service", "orders"),
        ("LambdaInvocation", count),
        ("timestamp", timestamp)
    ])
}

pub fn capacity_row(tenant: &str, service: &str, units: &str, timestamp: &str) -> ResultRow {
    ResultRow::from_pairs(&[
        ("TenantId", tenant),
        ("Service", service),
        ("CapacityUnits", units),
        ("timestamp", timestamp)
    ])
}
