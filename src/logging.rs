use std::collections::BTreeMap;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
    pub log_level: String,
    /// Static labels attached to every Loki stream
    pub labels: BTreeMap<String, String>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(
            "service".to_string(),
            std::env::var("SERVICE_NAME").unwrap_or_else(|_| "pricecast".to_string()),
        );
        labels.insert(
            "environment".to_string(),
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        );

        Self {
            loki_enabled: std::env::var("LOKI_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            loki_url: std::env::var("LOKI_URL").ok(),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            labels,
        }
    }

    pub fn with_label(mut self, key: &str, value: impl Into<String>) -> Self {
        self.labels.insert(key.to_string(), value.into());
        self
    }

    /// Tags log streams with the forecast mode and prices directory so runs
    /// against different stores can be told apart.
    pub fn for_pipeline(self, config: &AppConfig) -> Self {
        self.with_label("forecast_mode", config.forecast_mode.to_string())
            .with_label("prices_dir", config.prices_dir.display().to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err("LOKI_ENABLED is true but LOKI_URL is not set".to_string());
        }
        if let Err(e) = EnvFilter::try_new(&self.log_level) {
            return Err(format!("invalid RUST_LOG '{}': {}", self.log_level, e));
        }
        Ok(())
    }
}

pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    #[cfg(feature = "loki")]
    {
        if config.loki_enabled {
            if let Some(loki_url) = config.loki_url.clone() {
                return init_with_loki(config, &loki_url);
            }
        }
    }

    init_console_only(config)
}

fn init_console_only(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    tracing::debug!("📊 Console logging initialized ({:?})", config.labels);
    Ok(())
}

// Needs a running tokio runtime for the Loki push task
#[cfg(feature = "loki")]
fn init_with_loki(config: LoggingConfig, loki_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = url::Url::parse(loki_url)?;

    let mut builder = tracing_loki::builder();
    for (key, value) in &config.labels {
        builder = builder.label(key, value)?;
    }
    let (loki_layer, task) = builder.build_url(url)?;

    tokio::spawn(task);

    tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer())
        .with(loki_layer)
        .try_init()?;

    tracing::info!("✅ Loki logging initialized at {} with labels {:?}", loki_url, config.labels);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForecastMode;
    use std::path::PathBuf;

    fn console(level: &str) -> LoggingConfig {
        LoggingConfig {
            loki_enabled: false,
            loki_url: None,
            log_level: level.to_string(),
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_loki_requires_url() {
        let config = LoggingConfig {
            loki_enabled: true,
            ..console("info")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_filter_is_rejected() {
        assert!(console("info").validate().is_ok());
        assert!(console("pricecast=loud").validate().is_err());
    }

    #[test]
    fn test_pipeline_labels() {
        let app = AppConfig {
            prices_dir: PathBuf::from("/srv/prices"),
            forecast_mode: ForecastMode::Holdout,
            ..AppConfig::default()
        };

        let config = console("info").with_label("service", "pricecast").for_pipeline(&app);

        assert_eq!(config.labels["forecast_mode"], ForecastMode::Holdout.to_string());
        assert_eq!(config.labels["prices_dir"], "/srv/prices");
        assert_eq!(config.labels["service"], "pricecast");
    }
}
