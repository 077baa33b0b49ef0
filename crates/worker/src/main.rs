// Worker clippy configuration
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Acerto Certo Background Worker
//!
//! Handles scheduled jobs:
//! - Status recompute sweep for clients and subscribers (hourly)
//! - Invariant checks (daily at 03:30 UTC)
//! - Heartbeat (every 5 minutes)

mod jobs;

use std::sync::Arc;
use std::time::Duration;

use acerto_billing::{BillingService, InvariantChecker, PgBillingStore};
use acerto_shared::{create_pool_with, BusinessTimezone, Clock, SystemClock};
use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

const WORKER_MAX_CONNECTIONS: u32 = 5;

fn business_timezone() -> anyhow::Result<BusinessTimezone> {
    match std::env::var("BUSINESS_TIMEZONE") {
        Ok(name) if !name.trim().is_empty() => Ok(BusinessTimezone::from_name(name.trim())?),
        _ => Ok(BusinessTimezone::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Acerto Certo Worker");

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let tz = business_timezone()?;
    let pool = create_pool_with(&database_url, WORKER_MAX_CONNECTIONS).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let billing = BillingService::new(
        Arc::new(PgBillingStore::new(pool.clone())),
        clock.clone(),
        tz,
    );
    let checker = Arc::new(InvariantChecker::new(pool, tz, clock));

    info!(timezone = %tz, "Billing service ready");

    // Catch up on anything that lapsed while the worker was down
    jobs::run_status_sweep(&billing).await;

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Status recompute sweep
    // Cron: At minute 0 of every hour (UTC)
    let sweep_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let billing = sweep_billing.clone();
            Box::pin(async move {
                info!("Running scheduled status sweep");
                jobs::run_status_sweep(&billing).await;
            })
        })?)
        .await?;
    info!("Scheduled: Status sweep (hourly)");

    // Job 2: Invariant checks
    // Cron: At 03:30 every day, after the overnight date change in the business zone
    let invariant_checker = checker.clone();
    scheduler
        .add(Job::new_async("0 30 3 * * *", move |_uuid, _l| {
            let checker = invariant_checker.clone();
            Box::pin(async move {
                info!("Running scheduled invariant checks");
                jobs::run_invariant_checks(&checker).await;
            })
        })?)
        .await?;
    info!("Scheduled: Invariant checks (03:30 UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Acerto Certo Worker started successfully with {} scheduled jobs", 3);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
