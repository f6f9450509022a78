use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::models::{ArimaOrder, ForecastMetrics};

/// Result of one company's refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompanyOutcome {
    /// Persisted series already covers today; nothing fetched or written
    UpToDate { company: String },
    Refreshed {
        company: String,
        rows: usize,
        last_date: NaiveDate,
        /// Order of the persisted model
        order: ArimaOrder,
        /// Order of the held-out fit behind `metrics`
        evaluated_order: ArimaOrder,
        metrics: ForecastMetrics,
    },
    Failed { company: String, reason: String },
}

impl CompanyOutcome {
    pub fn company(&self) -> &str {
        match self {
            CompanyOutcome::UpToDate { company, .. }
            | CompanyOutcome::Refreshed { company, .. }
            | CompanyOutcome::Failed { company, .. } => company,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CompanyOutcome::Failed { .. })
    }
}

/// Aggregate of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: NaiveDateTime,
    pub duration_ms: i64,
    /// Set when the calendar gate skipped the whole batch
    pub market_closed: bool,
    pub outcomes: Vec<CompanyOutcome>,
}

impl BatchReport {
    pub fn skipped(started_at: NaiveDateTime) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            market_closed: true,
            outcomes: Vec::new(),
        }
    }

    pub fn refreshed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CompanyOutcome::Refreshed { .. }))
            .count()
    }

    pub fn up_to_date(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CompanyOutcome::UpToDate { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}
