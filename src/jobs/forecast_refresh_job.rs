//! Daily Forecast Refresh Job
//!
//! Refreshes the persisted price series, forecast and model of every
//! configured company.
//!
//! # Processing Strategy
//!
//! 1. Skip the whole batch when the market calendar says the refresh window
//!    is closed (weekends, Friday after close, Monday before open)
//! 2. Run the forecast trainer for every company concurrently, bounded by
//!    `max_workers`
//! 3. A failing company is reported in the batch report and never stops the
//!    others

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::errors::AppError;
use crate::models::{BatchReport, CompanyOutcome};
use crate::services::job_scheduler_service::JobContext;
use crate::services::market_calendar::is_market_open;

pub async fn run_forecast_refresh(ctx: JobContext) -> Result<BatchReport, AppError> {
    let started_at = ctx.clock.now();

    if ctx.market_hours_gate && !is_market_open(started_at) {
        info!("Market is closed. Skipping forecast refresh.");
        return Ok(BatchReport::skipped(started_at));
    }

    info!(
        "🔄 Refreshing forecasts for {} companies ({} workers)",
        ctx.companies.len(),
        ctx.max_workers
    );
    let timer = Instant::now();

    let semaphore = Arc::new(Semaphore::new(ctx.max_workers));
    let handles: Vec<_> = ctx
        .companies
        .iter()
        .cloned()
        .map(|company| {
            let trainer = ctx.trainer.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return CompanyOutcome::Failed {
                            company: company.name.clone(),
                            reason: format!("worker pool closed: {}", e),
                        }
                    }
                };
                trainer.train_company(&company).await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;

    let outcomes: Vec<CompanyOutcome> = results
        .into_iter()
        .zip(ctx.companies.iter())
        .map(|(result, company)| {
            result.unwrap_or_else(|e| {
                error!("❌ Worker for {} panicked: {}", company.name, e);
                CompanyOutcome::Failed {
                    company: company.name.clone(),
                    reason: format!("worker task failed: {}", e),
                }
            })
        })
        .collect();

    let report = BatchReport {
        started_at,
        duration_ms: timer.elapsed().as_millis() as i64,
        market_closed: false,
        outcomes,
    };

    info!(
        "✅ Forecast refresh done in {}ms: {} refreshed, {} up to date, {} failed",
        report.duration_ms,
        report.refreshed(),
        report.up_to_date(),
        report.failed()
    );

    Ok(report)
}
