use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::external::price_provider::PriceProvider;
use crate::models::{ArimaOrder, Company, CompanyOutcome, ForecastMetrics, ForecastMode, ForecastPoint, PriceSeries};
use crate::services::arima::{ArimaModel, AutoArima};
use crate::services::freshness::needs_refresh;
use crate::services::history_service::{fetch_history, next_business_days};
use crate::services::market_calendar::Clock;
use crate::services::price_store::PriceStore;

/// Fewest observations the model is fitted on, after the held-out window.
pub const MIN_TRAIN_OBSERVATIONS: usize = 30;

#[derive(Debug, Clone, Copy)]
pub struct TrainerSettings {
    pub history_start: NaiveDate,
    pub test_size: usize,
    pub forecast_mode: ForecastMode,
    pub arima: AutoArima,
}

impl From<&AppConfig> for TrainerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            history_start: config.history_start,
            test_size: config.test_size,
            forecast_mode: config.forecast_mode,
            arima: config.arima,
        }
    }
}

/// Output of a fit: the persisted forecast, the model that produced it and
/// the held-out accuracy.
#[derive(Debug, Clone)]
pub struct TrainedForecast {
    pub model: ArimaModel,
    /// Order of the held-out fit the metrics were computed on. Differs from
    /// `model.order()` when the future forecast comes from a refit.
    pub evaluated_order: ArimaOrder,
    pub metrics: ForecastMetrics,
    pub forecast: Vec<ForecastPoint>,
}

/// Evaluate on the trailing `test_size` observations, then produce the
/// forecast to persist according to `settings.forecast_mode`.
pub fn train_and_forecast(series: &PriceSeries, settings: &TrainerSettings) -> Result<TrainedForecast, AppError> {
    let needed = settings.test_size + MIN_TRAIN_OBSERVATIONS;
    if series.len() < needed {
        return Err(AppError::InsufficientData {
            needed,
            got: series.len(),
        });
    }

    let (train, test) = series.split_tail(settings.test_size);
    let train_closes: Vec<f64> = train.iter().map(|p| p.close).collect();
    let actual: Vec<f64> = test.iter().map(|p| p.close).collect();

    let holdout_model = settings.arima.fit(&train_closes)?;
    let evaluated_order = holdout_model.order();
    let predicted = holdout_model.forecast(test.len());
    let metrics = ForecastMetrics::evaluate(&actual, &predicted)?;

    match settings.forecast_mode {
        ForecastMode::Holdout => {
            let forecast = test
                .iter()
                .zip(predicted)
                .map(|(point, value)| ForecastPoint {
                    date: point.date,
                    predicted_close: value,
                })
                .collect();
            Ok(TrainedForecast {
                model: holdout_model,
                evaluated_order,
                metrics,
                forecast,
            })
        }
        ForecastMode::Future => {
            let last_date = series
                .last()
                .map(|p| p.date)
                .ok_or_else(|| AppError::Validation("empty series".to_string()))?;

            let model = settings.arima.fit(&series.closes())?;
            let forecast = next_business_days(last_date, settings.test_size)
                .into_iter()
                .zip(model.forecast(settings.test_size))
                .map(|(date, value)| ForecastPoint {
                    date,
                    predicted_close: value,
                })
                .collect();
            Ok(TrainedForecast {
                model,
                evaluated_order,
                metrics,
                forecast,
            })
        }
    }
}

/// Per-company refresh pipeline.
pub struct ForecastTrainer {
    provider: Arc<dyn PriceProvider>,
    store: PriceStore,
    clock: Arc<dyn Clock>,
    settings: TrainerSettings,
}

impl ForecastTrainer {
    pub fn new(
        provider: Arc<dyn PriceProvider>,
        store: PriceStore,
        clock: Arc<dyn Clock>,
        settings: TrainerSettings,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            settings,
        }
    }

    /// Never fails: errors are reported as [`CompanyOutcome::Failed`].
    pub async fn train_company(&self, company: &Company) -> CompanyOutcome {
        match self.refresh(company).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("❌ Error processing {}: {}", company.name, e);
                CompanyOutcome::Failed {
                    company: company.name.clone(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn refresh(&self, company: &Company) -> Result<CompanyOutcome, AppError> {
        let files = self.store.files(&company.name);
        let today = self.clock.today();

        if !needs_refresh(&files.data, today)? {
            info!("Data for {} is up to date. Skipping update.", company.name);
            return Ok(CompanyOutcome::UpToDate {
                company: company.name.clone(),
            });
        }

        let series = fetch_history(
            self.provider.as_ref(),
            &company.symbol,
            self.settings.history_start,
            today,
        )
        .await?;

        self.store.write_prices(&company.name, &series)?;

        let rows = series.len();
        let last_date = series
            .last()
            .map(|p| p.date)
            .ok_or_else(|| AppError::EmptyHistory(company.symbol.clone()))?;

        // Fitting is CPU-bound
        let settings = self.settings;
        let trained = tokio::task::spawn_blocking(move || train_and_forecast(&series, &settings))
            .await
            .map_err(|e| AppError::External(format!("model fit task failed: {}", e)))??;

        let order = trained.model.order();
        info!(
            "📈 {} held out {}: MAPE {:.4}, RMSE {:.2}, MAE {:.2}",
            company.name,
            trained.evaluated_order,
            trained.metrics.mape,
            trained.metrics.rmse,
            trained.metrics.mae
        );
        info!(
            "Forecasting {} with {} (AIC {:.2}, {} observations)",
            company.name,
            order,
            trained.model.aic(),
            trained.model.n_obs()
        );

        let forecast_path = self.store.write_forecast(&company.name, &trained.forecast)?;
        info!("Forecast saved for {} in {}", company.name, forecast_path.display());

        let model_path = self.store.write_model(&company.name, &trained.model)?;
        info!("Model saved for {} in {}", company.name, model_path.display());

        Ok(CompanyOutcome::Refreshed {
            company: company.name.clone(),
            rows,
            last_date,
            order,
            evaluated_order: trained.evaluated_order,
            metrics: trained.metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;
    use crate::services::history_service::resample_business_days;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn series_of(n: usize, close: impl Fn(usize) -> f64) -> PriceSeries {
        // 2024-01-01 is a Monday
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates = std::iter::once(start).chain(next_business_days(start, n - 1));
        resample_business_days(
            dates
                .enumerate()
                .map(|(i, date)| PricePoint::new(date, close(i)))
                .collect(),
        )
    }

    fn linear_series(n: usize) -> PriceSeries {
        series_of(n, |i| 100.0 + i as f64)
    }

    /// Standard normal draws (Box-Muller)
    fn gaussian(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
                let u2: f64 = rng.random();
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
            })
            .collect()
    }

    fn settings(mode: ForecastMode) -> TrainerSettings {
        TrainerSettings {
            history_start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap(),
            test_size: 30,
            forecast_mode: mode,
            arima: AutoArima::default(),
        }
    }

    #[test]
    fn test_holdout_mode_covers_test_dates() {
        let series = linear_series(120);

        let trained = train_and_forecast(&series, &settings(ForecastMode::Holdout)).unwrap();

        let (_, test) = series.split_tail(30);
        assert_eq!(trained.forecast.len(), 30);
        assert_eq!(trained.forecast[0].date, test[0].date);
        assert_eq!(trained.forecast[29].date, test[29].date);
        assert!(trained.metrics.mae < 1e-3);
    }

    #[test]
    fn test_future_mode_starts_after_last_close() {
        let series = linear_series(120);
        let last = *series.last().unwrap();

        let trained = train_and_forecast(&series, &settings(ForecastMode::Future)).unwrap();

        assert_eq!(trained.forecast.len(), 30);
        assert!(trained.forecast[0].date > last.date);
        assert!((trained.forecast[0].predicted_close - (last.close + 1.0)).abs() < 1e-3);
        assert_eq!(trained.model.n_obs(), 120);
    }

    #[test]
    fn test_short_series_is_rejected() {
        let series = linear_series(40);
        let result = train_and_forecast(&series, &settings(ForecastMode::Future));
        assert!(matches!(result, Err(AppError::InsufficientData { needed: 60, got: 40 })));
    }

    #[test]
    fn test_metrics_degrade_as_noise_grows() {
        let z = gaussian(300, 0);

        let metrics: Vec<ForecastMetrics> = [0.0, 0.5, 2.0, 8.0]
            .iter()
            .map(|scale| {
                let series = series_of(300, |i| {
                    let t = i as f64;
                    100.0 + 0.3 * t + 5.0 * (t / 8.0).sin() + scale * z[i]
                });
                train_and_forecast(&series, &settings(ForecastMode::Holdout))
                    .unwrap()
                    .metrics
            })
            .collect();

        for m in &metrics {
            assert!(m.mape.is_finite() && m.mape >= 0.0, "{m:?}");
            assert!(m.rmse.is_finite() && m.rmse >= 0.0, "{m:?}");
            assert!(m.mae.is_finite() && m.mae >= 0.0, "{m:?}");
        }
        for pair in metrics.windows(2) {
            assert!(pair[1].rmse > pair[0].rmse, "{:?}", metrics);
            assert!(pair[1].mae > pair[0].mae, "{:?}", metrics);
        }
    }

    #[test]
    fn test_future_mode_reports_the_held_out_order() {
        let series = series_of(200, |i| {
            let t = i as f64;
            50.0 + 0.2 * t + 4.0 * (t / 5.0).sin()
        });
        let arima = AutoArima::default();
        let (train, _) = series.split_tail(30);
        let train_closes: Vec<f64> = train.iter().map(|p| p.close).collect();
        let held_out = arima.fit(&train_closes).unwrap().order();
        let refit = arima.fit(&series.closes()).unwrap().order();

        let future = train_and_forecast(&series, &settings(ForecastMode::Future)).unwrap();
        let holdout = train_and_forecast(&series, &settings(ForecastMode::Holdout)).unwrap();

        assert_eq!(future.evaluated_order, held_out);
        assert_eq!(future.model.order(), refit);
        assert_eq!(holdout.evaluated_order, held_out);
        assert_eq!(holdout.model.order(), held_out);
        assert_eq!(future.metrics, holdout.metrics);
    }
}
