use crate::errors::AppError;
use crate::models::ForecastMetrics;

impl ForecastMetrics {
    /// Compare `predicted` against `actual`, position by position.
    pub fn evaluate(actual: &[f64], predicted: &[f64]) -> Result<Self, AppError> {
        if actual.len() != predicted.len() {
            return Err(AppError::Validation(format!(
                "actual and predicted lengths differ ({} vs {})",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(AppError::Validation("cannot score an empty forecast".to_string()));
        }

        Ok(Self {
            mape: mean_absolute_percentage_error(actual, predicted),
            rmse: mean_squared_error(actual, predicted).sqrt(),
            mae: mean_absolute_error(actual, predicted),
        })
    }
}

/// Mean of `|y - ŷ| / |y|`, as a fraction. Zero actuals are floored to
/// machine epsilon so the result stays finite.
pub fn mean_absolute_percentage_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted)
        .map(|(y, y_hat)| (y - y_hat).abs() / y.abs().max(f64::EPSILON))
        .sum::<f64>()
        / n
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted)
        .map(|(y, y_hat)| (y - y_hat).powi(2))
        .sum::<f64>()
        / n
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted)
        .map(|(y, y_hat)| (y - y_hat).abs())
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_forecast_scores_zero() {
        let actual = [10.0, 20.0, 30.0];
        let metrics = ForecastMetrics::evaluate(&actual, &actual).unwrap();
        assert_eq!(metrics, ForecastMetrics { mape: 0.0, rmse: 0.0, mae: 0.0 });
    }

    #[test]
    fn test_known_values() {
        let actual = [100.0, 200.0];
        let predicted = [110.0, 180.0];

        let metrics = ForecastMetrics::evaluate(&actual, &predicted).unwrap();

        // (0.1 + 0.1) / 2
        assert!((metrics.mape - 0.1).abs() < 1e-12);
        // sqrt((100 + 400) / 2)
        assert!((metrics.rmse - 250.0_f64.sqrt()).abs() < 1e-12);
        assert!((metrics.mae - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(ForecastMetrics::evaluate(&[1.0, 2.0], &[1.0]).is_err());
        assert!(ForecastMetrics::evaluate(&[], &[]).is_err());
    }
}
