use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;

use crate::errors::AppError;
use crate::external::yahoo::DEFAULT_BASE_URL;
use crate::models::{CompanyTable, ForecastMode};
use crate::services::arima::AutoArima;

pub const DEFAULT_HISTORY_START: &str = "2015-01-01";
pub const DEFAULT_REFRESH_SCHEDULE: &str = "0 0 17 * * Mon-Fri";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub prices_dir: PathBuf,
    pub companies_file: Option<PathBuf>,
    pub history_start: NaiveDate,
    pub test_size: usize,
    pub forecast_mode: ForecastMode,
    pub max_workers: usize,
    pub market_hours_gate: bool,
    pub arima: AutoArima,
    pub yahoo_base_url: String,
    pub http_timeout: Duration,
    pub refresh_schedule: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            prices_dir: PathBuf::from("prices"),
            companies_file: None,
            history_start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            test_size: 30,
            forecast_mode: ForecastMode::Future,
            max_workers: default_workers(),
            market_hours_gate: true,
            arima: AutoArima::default(),
            yahoo_base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            refresh_schedule: DEFAULT_REFRESH_SCHEDULE.to_string(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::Config(format!("{}='{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; `from_env` passes
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let arima = AutoArima {
            max_p: parse_var(&lookup, "ARIMA_MAX_P", defaults.arima.max_p)?,
            max_d: parse_var(&lookup, "ARIMA_MAX_D", defaults.arima.max_d)?,
            max_q: parse_var(&lookup, "ARIMA_MAX_Q", defaults.arima.max_q)?,
        };

        let config = Self {
            prices_dir: lookup("PRICES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.prices_dir),
            companies_file: lookup("COMPANIES_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            history_start: parse_var(&lookup, "HISTORY_START", defaults.history_start)?,
            test_size: parse_var(&lookup, "FORECAST_TEST_SIZE", defaults.test_size)?,
            forecast_mode: parse_var(&lookup, "FORECAST_MODE", defaults.forecast_mode)?,
            max_workers: parse_var(&lookup, "MAX_WORKERS", defaults.max_workers)?,
            market_hours_gate: parse_var(&lookup, "MARKET_HOURS_GATE", defaults.market_hours_gate)?,
            arima,
            yahoo_base_url: lookup("YAHOO_BASE_URL").unwrap_or(defaults.yahoo_base_url),
            http_timeout: Duration::from_secs(parse_var(
                &lookup,
                "HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            refresh_schedule: lookup("REFRESH_SCHEDULE").unwrap_or(defaults.refresh_schedule),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.test_size == 0 {
            return Err(AppError::Config("FORECAST_TEST_SIZE must be positive".to_string()));
        }
        if self.max_workers == 0 {
            return Err(AppError::Config("MAX_WORKERS must be positive".to_string()));
        }
        if self.arima.max_d > 2 {
            return Err(AppError::Config("ARIMA_MAX_D must be at most 2".to_string()));
        }
        if self.http_timeout.is_zero() {
            return Err(AppError::Config("HTTP_TIMEOUT_SECS must be positive".to_string()));
        }
        Ok(())
    }

    /// The configured company table, or the built-in one.
    pub fn load_companies(&self) -> Result<CompanyTable, AppError> {
        match &self.companies_file {
            Some(path) => CompanyTable::from_csv(path),
            None => Ok(CompanyTable::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.prices_dir, PathBuf::from("prices"));
        assert_eq!(config.history_start.to_string(), DEFAULT_HISTORY_START);
        assert_eq!(config.test_size, 30);
        assert_eq!(config.forecast_mode, ForecastMode::Future);
        assert!(config.market_hours_gate);
        assert!(config.max_workers >= 1);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PRICES_DIR", "/tmp/p"),
            ("FORECAST_MODE", "holdout"),
            ("MARKET_HOURS_GATE", "false"),
            ("ARIMA_MAX_P", "3"),
            ("HISTORY_START", "2020-06-01"),
        ])
        .unwrap();

        assert_eq!(config.prices_dir, PathBuf::from("/tmp/p"));
        assert_eq!(config.forecast_mode, ForecastMode::Holdout);
        assert!(!config.market_hours_gate);
        assert_eq!(config.arima.max_p, 3);
        assert_eq!(config.history_start, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(config_from(&[("FORECAST_TEST_SIZE", "abc")]), Err(AppError::Config(_))));
        assert!(matches!(config_from(&[("MAX_WORKERS", "0")]), Err(AppError::Config(_))));
        assert!(matches!(config_from(&[("ARIMA_MAX_D", "3")]), Err(AppError::Config(_))));
    }
}
