use crate::config::AppConfig;
use crate::errors::AppError;
use crate::external::price_provider::PriceProvider;
use crate::jobs::forecast_refresh_job;
use crate::models::{BatchReport, CompanyTable};
use crate::services::forecast_trainer::{ForecastTrainer, TrainerSettings};
use crate::services::market_calendar::Clock;
use crate::services::price_store::PriceStore;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use std::sync::Arc;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub companies: Arc<CompanyTable>,
    pub trainer: Arc<ForecastTrainer>,
    pub clock: Arc<dyn Clock>,
    pub max_workers: usize,
    pub market_hours_gate: bool,
}

impl JobContext {
    /// Wires the trainer from configuration; creates the prices directory.
    pub fn new(
        config: &AppConfig,
        companies: CompanyTable,
        provider: Arc<dyn PriceProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let store = PriceStore::open(&config.prices_dir)?;
        let trainer = ForecastTrainer::new(provider, store, clock.clone(), TrainerSettings::from(config));

        Ok(Self {
            companies: Arc::new(companies),
            trainer: Arc::new(trainer),
            clock,
            max_workers: config.max_workers,
            market_hours_gate: config.market_hours_gate,
        })
    }
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, context })
    }

    /// Register the forecast refresh job and start ticking.
    pub async fn start(&mut self, schedule: &str) -> Result<(), AppError> {
        info!("🚀 Starting job scheduler...");

        // Check if we're in test mode (runs jobs every minute for testing)
        let test_mode = std::env::var("JOB_SCHEDULER_TEST_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        if test_mode {
            info!("⚠️  JOB SCHEDULER IN TEST MODE - Jobs will run every minute!");
        }

        // format: sec min hour day month weekday
        let (refresh_schedule, refresh_desc) = if test_mode {
            ("0 */1 * * * *", "Every minute (TEST MODE)")
        } else {
            (schedule, "configured schedule")
        };

        self.schedule_job(
            refresh_schedule,
            "forecast_refresh",
            refresh_desc,
            forecast_refresh_job::run_forecast_refresh,
        )
        .await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping job scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), AppError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<BatchReport, AppError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| AppError::External(format!("Failed to create job {}: {}", job_name, e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

// Job tracking wrapper
pub async fn execute_job_with_tracking<F, Fut>(job_name: &str, context: JobContext, job_fn: Arc<F>)
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<BatchReport, AppError>>,
{
    info!("🏃 Starting job: {}", job_name);

    match job_fn(context).await {
        Ok(report) if report.market_closed => {
            info!("⏸️ Job skipped: {} (market closed)", job_name);
        }
        Ok(report) => {
            info!(
                "✅ Job completed: {} (refreshed: {}, up to date: {}, failed: {}, duration: {}ms)",
                job_name,
                report.refreshed(),
                report.up_to_date(),
                report.failed(),
                report.duration_ms
            );
        }
        Err(e) => {
            error!("❌ Job failed: {} - {}", job_name, e);
        }
    }
}
