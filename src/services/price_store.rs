use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::errors::AppError;
use crate::models::{ForecastPoint, PricePoint, PriceSeries};
use crate::services::arima::ArimaModel;

/// Per-company files under the prices directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyFiles {
    pub data: PathBuf,
    pub forecast: PathBuf,
    pub model: PathBuf,
}

/// Flat-file persistence for price series, forecasts and fitted models.
#[derive(Debug, Clone)]
pub struct PriceStore {
    root: PathBuf,
}

impl PriceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the prices directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AppError> {
        let store = Self::new(root);
        fs::create_dir_all(&store.root)?;
        Ok(store)
    }

    pub fn files(&self, company: &str) -> CompanyFiles {
        CompanyFiles {
            data: self.root.join(format!("{company}_data.csv")),
            forecast: self.root.join(format!("{company}_forecast.csv")),
            model: self.root.join(format!("{company}_model.json")),
        }
    }

    pub fn write_prices(&self, company: &str, series: &PriceSeries) -> Result<PathBuf, AppError> {
        let path = self.files(company).data;
        write_csv(&path, series.points())?;
        debug!("Wrote {} rows to {}", series.len(), path.display());
        Ok(path)
    }

    pub fn read_prices(&self, company: &str) -> Result<PriceSeries, AppError> {
        let path = self.files(company).data;
        let points: Vec<PricePoint> = read_csv(&path)?;
        Ok(PriceSeries::new(points))
    }

    pub fn write_forecast(&self, company: &str, forecast: &[ForecastPoint]) -> Result<PathBuf, AppError> {
        let path = self.files(company).forecast;
        write_csv(&path, forecast)?;
        debug!("Wrote {} forecast rows to {}", forecast.len(), path.display());
        Ok(path)
    }

    pub fn read_forecast(&self, company: &str) -> Result<Vec<ForecastPoint>, AppError> {
        read_csv(&self.files(company).forecast)
    }

    pub fn write_model(&self, company: &str, model: &ArimaModel) -> Result<PathBuf, AppError> {
        let path = self.files(company).model;
        let bytes = serde_json::to_vec_pretty(model)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    pub fn read_model(&self, company: &str) -> Result<ArimaModel, AppError> {
        let path = self.files(company).model;
        if !path.exists() {
            return Err(AppError::NotFound(path.display().to_string()));
        }
        let bytes = fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// Write to a sibling temp file and rename over the target
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AppError> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::External(format!("Failed to flush CSV buffer: {}", e)))?;
    write_atomic(path, &bytes)
}

fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, AppError> {
    if !path.exists() {
        return Err(AppError::NotFound(path.display().to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn test_file_names() {
        let store = PriceStore::new("prices");
        let files = store.files("Apple");

        assert_eq!(files.data, PathBuf::from("prices/Apple_data.csv"));
        assert_eq!(files.forecast, PathBuf::from("prices/Apple_forecast.csv"));
        assert_eq!(files.model, PathBuf::from("prices/Apple_model.json"));
    }

    #[test]
    fn test_price_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::open(dir.path()).unwrap();
        let series = PriceSeries::new(vec![
            PricePoint::new(d(1), 101.5),
            PricePoint::new(d(2), 102.25),
        ]);

        let path = store.write_prices("Apple", &series).unwrap();

        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "Date,Close\n2024-05-01,101.5\n2024-05-02,102.25\n");
        assert_eq!(store.read_prices("Apple").unwrap(), series);
    }

    #[test]
    fn test_rewrite_replaces_prior_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::open(dir.path()).unwrap();

        store
            .write_forecast("Tesla", &[ForecastPoint { date: d(1), predicted_close: 1.0 }; 3])
            .unwrap();
        store
            .write_forecast("Tesla", &[ForecastPoint { date: d(2), predicted_close: 2.0 }])
            .unwrap();

        let forecast = store.read_forecast("Tesla").unwrap();
        assert_eq!(forecast.len(), 1);
        assert_eq!(forecast[0].predicted_close, 2.0);
        assert!(!dir.path().join("Tesla_forecast.csv.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::new(dir.path());

        assert!(matches!(store.read_prices("Nope"), Err(AppError::NotFound(_))));
        assert!(matches!(store.read_model("Nope"), Err(AppError::NotFound(_))));
    }
}
