use thiserror::Error;

use crate::external::price_provider::PriceProviderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Price provider error: {0}")]
    Provider(#[from] PriceProviderError),
    #[error("No price history returned for {0}")]
    EmptyHistory(String),
    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("Model error: {0}")]
    Model(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("External error: {0}")]
    External(String),
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}
