use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::external::price_provider::{DateRange, ExternalPricePoint, PriceProvider, PriceProviderError};
use crate::models::{PricePoint, PriceSeries};

/// Fetch daily closes for `symbol` from `start` through `today`, as a
/// business-day series with gaps interpolated.
///
/// An empty answer for the bounded range is retried once without a range.
pub async fn fetch_history(
    provider: &dyn PriceProvider,
    symbol: &str,
    start: NaiveDate,
    today: NaiveDate,
) -> Result<PriceSeries, AppError> {
    // Provider ranges are end-exclusive; include today's close
    let range = DateRange {
        start,
        end: today + Duration::days(1),
    };

    let mut raw = fetch_or_empty(provider, symbol, Some(range)).await?;

    if raw.is_empty() {
        warn!(
            "⚠️ No data for {} between {} and {}, retrying without a date range",
            symbol, range.start, today
        );
        raw = fetch_or_empty(provider, symbol, None).await?;
    }

    if raw.is_empty() {
        return Err(AppError::EmptyHistory(symbol.to_string()));
    }

    let series = resample_business_days(
        raw.into_iter()
            .map(|p| PricePoint::new(p.date, p.close))
            .collect(),
    );

    match (series.first(), series.last()) {
        (Some(first), Some(last)) => {
            info!(
                "Data for {} starts from {} and ends at {} ({} business days)",
                symbol,
                first.date,
                last.date,
                series.len()
            );
            Ok(series)
        }
        _ => Err(AppError::EmptyHistory(symbol.to_string())),
    }
}

async fn fetch_or_empty(
    provider: &dyn PriceProvider,
    symbol: &str,
    range: Option<DateRange>,
) -> Result<Vec<ExternalPricePoint>, AppError> {
    match provider.fetch_daily_history(symbol, range).await {
        Ok(points) => Ok(points),
        Err(PriceProviderError::NotFound) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The `n` business days strictly after `date`.
pub fn next_business_days(date: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(n);
    let mut current = date;
    while out.len() < n {
        current += Duration::days(1);
        if is_business_day(current) {
            out.push(current);
        }
    }
    out
}

/// Reindex to every weekday between the first and last weekday observation.
///
/// Missing weekdays are filled by linear interpolation between the
/// neighbouring observations (evenly spaced by position, weekends ignored).
/// Weekend observations are dropped; weekday observations are kept as-is.
pub fn resample_business_days(points: Vec<PricePoint>) -> PriceSeries {
    let observed: BTreeMap<NaiveDate, f64> = points
        .into_iter()
        .filter(|p| is_business_day(p.date) && p.close.is_finite())
        .map(|p| (p.date, p.close))
        .collect();

    let (Some((&first, _)), Some((&last, _))) = (observed.first_key_value(), observed.last_key_value()) else {
        return PriceSeries::default();
    };

    let mut dates = Vec::new();
    let mut day = first;
    while day <= last {
        if is_business_day(day) {
            dates.push(day);
        }
        day += Duration::days(1);
    }

    let mut values: Vec<Option<f64>> = dates.iter().map(|d| observed.get(d).copied()).collect();

    let mut prev: Option<usize> = None;
    for i in 0..values.len() {
        if values[i].is_none() {
            continue;
        }
        if let Some(p) = prev {
            if i - p > 1 {
                let (start, end) = (values[p].unwrap_or_default(), values[i].unwrap_or_default());
                let span = (i - p) as f64;
                for (k, slot) in values.iter_mut().enumerate().take(i).skip(p + 1) {
                    let w = (k - p) as f64 / span;
                    *slot = Some(start + (end - start) * w);
                }
            }
        }
        prev = Some(i);
    }

    PriceSeries::new(
        dates
            .into_iter()
            .zip(values)
            .filter_map(|(date, v)| v.map(|close| PricePoint::new(date, close)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_next_business_days_skips_weekend() {
        // 2024-06-07 is a Friday
        let days = next_business_days(d(2024, 6, 7), 3);
        assert_eq!(days, vec![d(2024, 6, 10), d(2024, 6, 11), d(2024, 6, 12)]);
    }

    #[test]
    fn test_resample_fills_gap_linearly() {
        // Mon 10, (Tue, Wed missing), Thu 40
        let series = resample_business_days(vec![
            PricePoint::new(d(2024, 6, 3), 10.0),
            PricePoint::new(d(2024, 6, 6), 40.0),
        ]);

        assert_eq!(series.closes(), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_resample_ignores_weekends() {
        // Fri 10, Sat 999 (dropped), Mon missing, Tue 30
        let series = resample_business_days(vec![
            PricePoint::new(d(2024, 6, 7), 10.0),
            PricePoint::new(d(2024, 6, 8), 999.0),
            PricePoint::new(d(2024, 6, 11), 30.0),
        ]);

        assert_eq!(series.dates(), vec![d(2024, 6, 7), d(2024, 6, 10), d(2024, 6, 11)]);
        assert_eq!(series.closes(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample_business_days(Vec::new()).is_empty());
    }
}
