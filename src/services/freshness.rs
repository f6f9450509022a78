use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::info;

use crate::errors::AppError;
use crate::models::PricePoint;

/// Whether the price file at `path` needs to be refetched on `today`.
///
/// Missing or empty files need a refresh, as does a file whose latest date is
/// before `today`. Unparseable files are an error.
pub fn needs_refresh(path: &Path, today: NaiveDate) -> Result<bool, AppError> {
    if !path.exists() {
        info!("File {} does not exist. Needs update.", path.display());
        return Ok(true);
    }

    let Some(last_date) = last_recorded_date(path)? else {
        info!("File {} has no rows. Needs update.", path.display());
        return Ok(true);
    };

    info!(
        "Last date in {}: {}, today's date: {}",
        path.display(),
        last_date,
        today
    );

    if last_date < today {
        info!("Data in {} is not up to date. Needs update.", path.display());
        Ok(true)
    } else {
        info!("Data in {} is up to date. No update needed.", path.display());
        Ok(false)
    }
}

/// Latest date in a `Date,Close` file, regardless of row order.
pub fn last_recorded_date(path: &Path) -> Result<Option<NaiveDate>, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut latest: Option<NaiveDate> = None;
    for row in reader.deserialize() {
        let point: PricePoint = row?;
        latest = Some(latest.map_or(point.date, |d| d.max(point.date)));
    }
    Ok(latest)
}
