use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Same headers as the price file so the consumer reads both the same way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Close")]
    pub predicted_close: f64,
}

/// Accuracy of a forecast against held-out actuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean absolute percentage error, as a fraction
    pub mape: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// ARIMA(p, d, q) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Which dates the persisted forecast covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMode {
    /// Business days after the last observed close, from a model refit on
    /// the whole series
    Future,
    /// The held-out evaluation window
    Holdout,
}

impl Default for ForecastMode {
    fn default() -> Self {
        ForecastMode::Future
    }
}

impl fmt::Display for ForecastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastMode::Future => write!(f, "future"),
            ForecastMode::Holdout => write!(f, "holdout"),
        }
    }
}

impl FromStr for ForecastMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "future" => Ok(ForecastMode::Future),
            "holdout" => Ok(ForecastMode::Holdout),
            other => Err(format!(
                "Invalid forecast mode: {}. Must be 'future' or 'holdout'",
                other
            )),
        }
    }
}

/// What the voice front end reports for "predicted price of X".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictedPrice {
    pub company: String,
    pub symbol: String,
    pub forecast_date: NaiveDate,
    pub predicted_price: f64,
    pub last_close_date: NaiveDate,
    pub last_close: f64,
    pub percentage_change: f64,
}
