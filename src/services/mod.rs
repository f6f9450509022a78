pub mod arima;
pub mod forecast_trainer;
pub mod freshness;
pub mod history_service;
pub mod job_scheduler_service;
pub mod market_calendar;
pub mod metrics;
pub mod prediction_service;
pub mod price_store;
