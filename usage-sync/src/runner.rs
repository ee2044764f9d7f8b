//! Process entry point: logging, configuration, AWS clients, job dispatch.

use crate::aws::{CloudFormationResources, CloudWatchLogsInsights, load_sdk_config};
use crate::config::UsageSyncConfig;
use crate::jobs::{AggregationService, JobKind, JobReport};
use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "usage-sync",
    author,
    version,
    about = "Report per-tenant pooled usage to CloudZero",
    long_about = "Queries the pooled stack's Lambda log groups with Logs Insights over the \
                  trailing lookback window and posts per-tenant telemetry records.\n\nRequires \
                  NUMBER_OF_HOURS and CLOUDZERO_API_KEY in the environment."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run an aggregation job once")]
    Run(RunArgs)
}

#[derive(Args)]
pub struct RunArgs {
    /// Job to run
    #[arg(value_enum, default_value_t = JobKind::All)]
    pub job: JobKind,

    /// Override NUMBER_OF_HOURS
    #[arg(long)]
    pub lookback_hours: Option<u32>,

    /// Override the telemetry ingestion endpoint
    #[arg(long, env = "TELEMETRY_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Print the job reports as JSON
    #[arg(long)]
    pub json: bool
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing();

    match cli.command {
        Commands::Run(args) => run_job(args).await
    }
}

fn load_config(args: &RunArgs) -> Result<UsageSyncConfig> {
    let mut config = UsageSyncConfig::from_env()?;
    if let Some(hours) = args.lookback_hours {
        config.lookback_hours = hours;
    }
    if let Some(endpoint) = &args.endpoint {
        config.telemetry_endpoint = endpoint.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run_job(args: RunArgs) -> Result<()> {
    let config = load_config(&args)?;

    let sdk_config = load_sdk_config().await;
    let stack = Arc::new(CloudFormationResources::new(&sdk_config));
    let logs = Arc::new(CloudWatchLogsInsights::new(&sdk_config));
    let service = AggregationService::new(config, stack, logs)?;

    let reports = service.run(args.job).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_summary(report);
        }
    }

    let rejected: Vec<String> = reports
        .iter()
        .filter(|r| !r.all_delivered())
        .map(|r| r.job.to_string())
        .collect();
    if !rejected.is_empty() {
        bail!("telemetry endpoint rejected batches for: {}", rejected.join(", "));
    }
    Ok(())
}

fn print_summary(report: &JobReport) {
    println!(
        "{} [{} .. {})",
        report.job,
        report.window.start.to_rfc3339(),
        report.window.end.to_rfc3339()
    );
    for delivery in &report.deliveries {
        println!(
            "  {:<18} sources={} status={} rows={} records={} outcome={:?}",
            delivery.target_group,
            delivery.sources.len(),
            delivery.query_status,
            delivery.rows,
            delivery.records,
            delivery.outcome
        );
    }
}
