use tracing::info;

use crate::errors::AppError;
use crate::models::{Company, PredictedPrice};
use crate::services::price_store::PriceStore;

/// The predicted price the voice front end reports: the final forecast row
/// against the final persisted close.
pub fn predicted_price(store: &PriceStore, company: &Company) -> Result<PredictedPrice, AppError> {
    let forecast = store.read_forecast(&company.name)?;
    let prices = store.read_prices(&company.name)?;

    let predicted = forecast
        .last()
        .ok_or_else(|| AppError::NotFound(format!("no forecast rows for {}", company.name)))?;
    let last_close = prices
        .last()
        .ok_or_else(|| AppError::NotFound(format!("no price rows for {}", company.name)))?;

    if last_close.close == 0.0 {
        return Err(AppError::Validation(format!(
            "last close for {} is zero",
            company.name
        )));
    }

    let percentage_change = (predicted.predicted_close - last_close.close) / last_close.close * 100.0;

    info!(
        "🔮 Predicted price of {} ({}) on {} is {:.2}, a change of {:.2}% from {:.2}",
        company.name,
        company.symbol,
        predicted.date,
        predicted.predicted_close,
        percentage_change,
        last_close.close
    );

    Ok(PredictedPrice {
        company: company.name.clone(),
        symbol: company.symbol.clone(),
        forecast_date: predicted.date,
        predicted_price: predicted.predicted_close,
        last_close_date: last_close.date,
        last_close: last_close.close,
        percentage_change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForecastPoint, PricePoint, PriceSeries};
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    #[test]
    fn test_reads_final_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::open(dir.path()).unwrap();
        let apple = Company::new("Apple", "AAPL");

        store
            .write_prices(
                "Apple",
                &PriceSeries::new(vec![PricePoint::new(d(1), 180.0), PricePoint::new(d(2), 200.0)]),
            )
            .unwrap();
        store
            .write_forecast(
                "Apple",
                &[
                    ForecastPoint { date: d(3), predicted_close: 205.0 },
                    ForecastPoint { date: d(4), predicted_close: 210.0 },
                ],
            )
            .unwrap();

        let prediction = predicted_price(&store, &apple).unwrap();

        assert_eq!(prediction.predicted_price, 210.0);
        assert_eq!(prediction.forecast_date, d(4));
        assert_eq!(prediction.last_close, 200.0);
        assert!((prediction.percentage_change - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_forecast_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = PriceStore::open(dir.path()).unwrap();

        let result = predicted_price(&store, &Company::new("Tesla", "TSLA"));

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
