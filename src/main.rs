use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pricecast::config::AppConfig;
use pricecast::errors::AppError;
use pricecast::external::price_provider::PriceProvider;
use pricecast::external::yahoo::YahooProvider;
use pricecast::jobs::forecast_refresh_job::run_forecast_refresh;
use pricecast::logging::{init_logging, LoggingConfig};
use pricecast::models::CompanyTable;
use pricecast::services::job_scheduler_service::{JobContext, JobSchedulerService};
use pricecast::services::market_calendar::SystemClock;
use pricecast::services::prediction_service::predicted_price;
use pricecast::services::price_store::PriceStore;

#[derive(Debug, Parser)]
#[command(name = "pricecast", version, about = "Daily stock price forecasts for the voice assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh stale price series and forecasts once (default)
    Refresh,
    /// Run the refresh on the configured cron schedule until interrupted
    Schedule,
    /// Print the predicted price of a company by name or ticker
    Predict { company: String },
    /// List the configured companies
    Companies,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Invalid configuration")?;

    init_logging(LoggingConfig::from_env().for_pipeline(&config))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let companies = config.load_companies().context("Failed to load company table")?;

    match cli.command.unwrap_or(Command::Refresh) {
        Command::Refresh => {
            let ctx = build_context(&config, companies)?;
            let report = run_forecast_refresh(ctx).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Schedule => {
            let ctx = build_context(&config, companies)?;
            let mut scheduler = JobSchedulerService::new(ctx).await?;
            scheduler.start(&config.refresh_schedule).await?;

            tokio::signal::ctrl_c().await?;
            scheduler.stop().await?;
        }
        Command::Predict { company } => {
            let company = companies
                .find(&company)
                .ok_or_else(|| AppError::NotFound(format!("no configured company '{}'", company)))?;
            let store = PriceStore::new(&config.prices_dir);
            let prediction = predicted_price(&store, company)?;
            println!(
                "The predicted price of {} ({}) for {} is ${:.2}, which is a change of {:.2}%",
                prediction.company,
                prediction.symbol,
                prediction.forecast_date,
                prediction.predicted_price,
                prediction.percentage_change
            );
        }
        Command::Companies => {
            for company in companies.iter() {
                println!("{}\t{}", company.name, company.symbol);
            }
        }
    }

    Ok(())
}

fn build_context(
    config: &AppConfig,
    companies: CompanyTable,
) -> Result<JobContext, AppError> {
    tracing::info!("📊 Using price provider: Yahoo Finance ({})", config.yahoo_base_url);
    let provider: Arc<dyn PriceProvider> =
        Arc::new(YahooProvider::new(config.yahoo_base_url.clone(), config.http_timeout));

    JobContext::new(config, companies, provider, Arc::new(SystemClock))
}
