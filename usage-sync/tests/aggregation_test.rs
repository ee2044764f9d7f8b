mod common;

use chrono::{TimeZone, Utc};
use common::{FakeLogs, FakeStack, capacity_row, complete, invocation_row, status};
use serde_json::Value;
use std::sync::Arc;
use usage_sync::aws::StackResource;
use usage_sync::query::{QueryStatus, ResultRow};
use usage_sync::queries::{INVOCATION_QUERY, ORDER_CAPACITY_QUERY, PRODUCT_CAPACITY_QUERY};
use usage_sync::{AggregationService, JobKind, PublishOutcome, UsageSyncConfig, UsageSyncError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TELEMETRY_PATH: &str = "/unit-cost/v1/telemetry";

fn pooled_stack() -> FakeStack {
    FakeStack::single_page(vec![
        StackResource::new("CreateOrderFunction", "create-order"),
        StackResource::new("UpdateOrderFunction", "update-order"),
        StackResource::new("GetOrdersFunction", "get-orders"),
        StackResource::new("CreateProductFunction", "create-product"),
        StackResource::new("UpdateProductFunction", "update-product"),
        StackResource::new("GetProductsFunction", "get-products"),
        StackResource::new("OrderTable", "order-table"),
    ])
}

fn pooled_log_groups() -> FakeLogs {
    FakeLogs::new().with_log_groups(&[
        "/aws/lambda/create-order",
        "/aws/lambda/update-order",
        "/aws/lambda/get-orders",
        "/aws/lambda/create-product",
        "/aws/lambda/get-products"
    ])
}

fn config(server: &MockServer) -> UsageSyncConfig {
    UsageSyncConfig::builder()
        .lookback_hours(24)
        .api_key("test-key")
        .poll_interval_seconds(1)
        .telemetry_endpoint(format!("{}{TELEMETRY_PATH}", server.uri()))
        .build()
        .unwrap()
}

fn service(server: &MockServer, logs: Arc<FakeLogs>) -> AggregationService {
    AggregationService::new(config(server), Arc::new(pooled_stack()), logs).unwrap()
}

async fn posted_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn now() -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

#[tokio::test]
async fn test_invocation_job_end_to_end() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TELEMETRY_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let logs = Arc::new(pooled_log_groups().with_script(vec![complete(vec![
        invocation_row("t1", "42", "2023-11-15 00:00:00.000"),
        invocation_row("t2", "7", "2023-11-15 00:00:00.000"),
    ])]));
    let report = service(&mock_server, logs.clone())
        .aggregate_at(JobKind::Invocations, now())
        .await
        .unwrap();

    let submitted = logs.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].query, INVOCATION_QUERY);
    assert_eq!(submitted[0].window.end_epoch(), 1_700_000_000);
    assert_eq!(submitted[0].window.start_epoch(), 1_700_000_000 - 24 * 3600);
    assert_eq!(
        submitted[0].sources,
        vec![
            "/aws/lambda/create-order".to_string(),
            "/aws/lambda/get-orders".to_string(),
            "/aws/lambda/create-product".to_string(),
            "/aws/lambda/get-products".to_string()
        ]
    );

    assert_eq!(report.deliveries.len(), 1);
    assert_eq!(report.deliveries[0].records, 2);
    assert!(report.all_delivered());
    assert!(report.completed_at.is_some());

    let bodies = posted_bodies(&mock_server).await;
    let records = bodies[0]["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["element-name"], "t1");
    assert_eq!(records[0]["value"], 42.0);
    assert_eq!(records[1]["element-name"], "t2");
}

#[tokio::test]
async fn test_capacity_job_publishes_each_group() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TELEMETRY_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&mock_server)
        .await;

    let logs = Arc::new(
        pooled_log_groups()
            .with_script(vec![complete(vec![capacity_row(
                "t1",
                "products",
                "3.5",
                "1700000000"
            )])])
            .with_script(vec![
                status(QueryStatus::Running),
                complete(vec![capacity_row("t2", "orders", "2", "1700000000")]),
            ])
    );
    let report = service(&mock_server, logs.clone())
        .aggregate_at(JobKind::CapacityUnits, now())
        .await
        .unwrap();

    let submitted = logs.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].query, PRODUCT_CAPACITY_QUERY);
    // update-product has no log group yet.
    assert_eq!(
        submitted[0].sources,
        vec![
            "/aws/lambda/create-product".to_string(),
            "/aws/lambda/get-products".to_string()
        ]
    );
    assert_eq!(submitted[1].query, ORDER_CAPACITY_QUERY);
    assert_eq!(submitted[1].sources.len(), 3);

    let groups: Vec<&str> = report
        .deliveries
        .iter()
        .map(|d| d.target_group.as_str())
        .collect();
    assert_eq!(groups, vec!["product-service", "order-service"]);

    let bodies = posted_bodies(&mock_server).await;
    assert_eq!(bodies.len(), 2);
    let product = &bodies[0]["records"][0];
    assert_eq!(product["value"], 3.5);
    assert_eq!(product["telemetry-stream"], "Pooled-CapacityUnits");
    assert_eq!(product["filter"]["service"][0], "AmazonDynamoDB");
    assert_eq!(bodies[1]["records"][0]["element-name"], "t2");
}

#[tokio::test]
async fn test_empty_results_skip_publishing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let logs = Arc::new(FakeLogs::new());
    let service = AggregationService::new(
        config(&mock_server),
        Arc::new(FakeStack::single_page(vec![])),
        logs.clone()
    )
    .unwrap();

    let report = service
        .aggregate_at(JobKind::CapacityUnits, now())
        .await
        .unwrap();

    // Both queries still go out, over no sources.
    assert_eq!(logs.submitted().len(), 2);
    assert!(logs.submitted().iter().all(|q| q.sources.is_empty()));
    assert!(
        report
            .deliveries
            .iter()
            .all(|d| d.outcome == PublishOutcome::Skipped)
    );
    assert!(report.all_delivered());
    assert_eq!(report.records_published(), 0);
}

#[tokio::test]
async fn test_rejected_delivery_is_reported_not_raised() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&mock_server)
        .await;

    let logs = Arc::new(pooled_log_groups().with_script(vec![complete(vec![
        invocation_row("t1", "1", "1700000000"),
    ])]));
    let report = service(&mock_server, logs)
        .aggregate_at(JobKind::Invocations, now())
        .await
        .unwrap();

    assert!(!report.all_delivered());
    assert_eq!(
        report.deliveries[0].outcome,
        PublishOutcome::Delivered {
            status: 401,
            body: "unauthorized".to_string()
        }
    );
}

#[tokio::test]
async fn test_short_rows_abort_the_job() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let logs = Arc::new(pooled_log_groups().with_script(vec![complete(vec![
        ResultRow::from_pairs(&[("TenantId", "t1"), ("LambdaInvocation", "3")]),
    ])]));
    let err = service(&mock_server, logs)
        .aggregate_at(JobKind::Invocations, now())
        .await
        .unwrap_err();

    assert!(err.is_contract_violation());
}

#[tokio::test]
async fn test_query_failure_stops_before_any_publish() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let logs = Arc::new(pooled_log_groups().failing_start());
    let err = service(&mock_server, logs)
        .run(JobKind::All)
        .await
        .unwrap_err();

    assert!(matches!(err, UsageSyncError::LogInsights { .. }));
}

#[tokio::test]
async fn test_run_all_runs_both_jobs() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let logs = Arc::new(pooled_log_groups().with_script(vec![complete(vec![
        invocation_row("t1", "5", "1700000000"),
    ])]));
    let reports = service(&mock_server, logs.clone())
        .run(JobKind::All)
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].job, JobKind::Invocations);
    assert_eq!(reports[1].job, JobKind::CapacityUnits);
    assert_eq!(logs.submitted().len(), 3);
}

#[tokio::test]
async fn test_all_is_not_a_single_job() {
    let mock_server = MockServer::start().await;
    let err = service(&mock_server, Arc::new(FakeLogs::new()))
        .aggregate_at(JobKind::All, now())
        .await
        .unwrap_err();
    assert!(matches!(err, UsageSyncError::Config(_)));
}
