//! Background Jobs Module
//!
//! Jobs run either once from the command line or on a cron schedule through
//! the job scheduler service. Each job takes a `JobContext` and returns a
//! `BatchReport`.
//!
//! # Available Jobs
//!
//! - `forecast_refresh_job` - Refetches stale price series and regenerates
//!   per-company forecasts and models

pub mod forecast_refresh_job;
