use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Date window for a history request. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Error)]
pub enum PriceProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("ticker not found")]
    NotFound,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Daily closes for `ticker`, oldest first. `None` asks the provider for
    /// everything it has.
    async fn fetch_daily_history(
        &self,
        ticker: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<ExternalPricePoint>, PriceProviderError>;
}
