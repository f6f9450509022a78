//! Automatic ARIMA(p, d, q) order selection and forecasting.
//!
//! The differencing order comes from repeated KPSS level-stationarity tests.
//! Each candidate ARMA(p, q) on the differenced series is estimated with the
//! Hannan–Rissanen two-stage regression and the lowest AIC wins.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::ArimaOrder;

/// 5% critical value of the KPSS level-stationarity statistic.
const KPSS_CRITICAL_5PCT: f64 = 0.463;
const MIN_OBSERVATIONS: usize = 10;
const VARIANCE_FLOOR: f64 = 1e-12;

/// Order search bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoArima {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for AutoArima {
    fn default() -> Self {
        Self {
            max_p: 5,
            max_d: 2,
            max_q: 2,
        }
    }
}

/// A fitted ARIMA model together with the state needed to forecast from the
/// end of its training series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaModel {
    order: ArimaOrder,
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    aic: f64,
    n_obs: usize,
    /// Last value of the series differenced 0..d times
    level_tails: Vec<f64>,
    /// Last `p` values of the differenced series, oldest first
    recent: Vec<f64>,
    /// Last `q` residuals, oldest first
    recent_residuals: Vec<f64>,
}

impl ArimaModel {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// Point forecasts for the next `steps` observations after the training
    /// series. Future innovations are taken as zero.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let mut history = self.recent.clone();
        let mut residuals = self.recent_residuals.clone();
        let mut diffs = Vec::with_capacity(steps);

        for _ in 0..steps {
            let mut next = self.constant;
            for (i, phi) in self.ar.iter().enumerate() {
                next += phi * history[history.len() - 1 - i];
            }
            for (j, theta) in self.ma.iter().enumerate() {
                next += theta * residuals[residuals.len() - 1 - j];
            }
            diffs.push(next);

            if !history.is_empty() {
                history.remove(0);
                history.push(next);
            }
            if !residuals.is_empty() {
                residuals.remove(0);
                residuals.push(0.0);
            }
        }

        integrate(diffs, &self.level_tails)
    }
}

impl AutoArima {
    pub fn fit(&self, series: &[f64]) -> Result<ArimaModel, AppError> {
        if series.len() < MIN_OBSERVATIONS {
            return Err(AppError::InsufficientData {
                needed: MIN_OBSERVATIONS,
                got: series.len(),
            });
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(AppError::Model("series contains non-finite values".to_string()));
        }

        let (d, level_tails, w) = self.select_differencing(series);
        let include_constant = d < 2;

        // Score every candidate on the same window so AICs are comparable
        let eval_start = self.max_p.min(w.len() / 2);

        let mut best: Option<ArmaFit> = None;
        for p in 0..=self.max_p {
            for q in 0..=self.max_q {
                let Some(fit) = fit_arma(&w, p, q, include_constant, eval_start) else {
                    continue;
                };
                // Strict comparison keeps the simpler order on ties
                if best.as_ref().map_or(true, |b| fit.aic < b.aic) {
                    best = Some(fit);
                }
            }
        }

        let fit = best.ok_or_else(|| {
            AppError::Model(format!("no ARMA order could be fitted to {} observations", w.len()))
        })?;

        let order = ArimaOrder {
            p: fit.ar.len(),
            d,
            q: fit.ma.len(),
        };

        Ok(ArimaModel {
            order,
            recent: w[w.len() - order.p..].to_vec(),
            recent_residuals: fit.residuals[fit.residuals.len() - order.q..].to_vec(),
            constant: fit.constant,
            ar: fit.ar,
            ma: fit.ma,
            sigma2: fit.sigma2,
            aic: fit.aic,
            n_obs: series.len(),
            level_tails,
        })
    }

    /// Differences until KPSS accepts stationarity or `max_d` is reached.
    fn select_differencing(&self, series: &[f64]) -> (usize, Vec<f64>, Vec<f64>) {
        let mut tails = Vec::new();
        let mut current = series.to_vec();
        let mut d = 0;

        while d < self.max_d && current.len() > MIN_OBSERVATIONS && !is_level_stationary(&current) {
            tails.push(current[current.len() - 1]);
            current = difference(&current);
            d += 1;
        }

        (d, tails, current)
    }
}

struct ArmaFit {
    constant: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    residuals: Vec<f64>,
    sigma2: f64,
    aic: f64,
}

fn fit_arma(w: &[f64], p: usize, q: usize, include_constant: bool, eval_start: usize) -> Option<ArmaFit> {
    let n = w.len();
    let k = p + q + usize::from(include_constant);

    // Stage one: innovations from a long autoregression
    let innovations = if q > 0 {
        let m = (p + q + 1).max((n / 10).min(20));
        if n <= 2 * m + q + 1 {
            return None;
        }
        let coef = ols_autoregression(w, m)?;
        let mut e = vec![0.0; n];
        for t in m..n {
            let mut fitted = coef[0];
            for i in 1..=m {
                fitted += coef[i] * w[t - i];
            }
            e[t] = w[t] - fitted;
        }
        Some((m, e))
    } else {
        None
    };

    // Stage two: regress on own lags and lagged innovations
    let (constant, ar, ma) = if k == 0 {
        (0.0, Vec::new(), Vec::new())
    } else {
        let start = match &innovations {
            Some((m, _)) => p.max(m + q),
            None => p,
        };
        let rows = n.checked_sub(start)?;
        if rows <= k + 1 {
            return None;
        }

        let mut x = Array2::<f64>::zeros((rows, k));
        let mut y = Array1::<f64>::zeros(rows);
        for (r, t) in (start..n).enumerate() {
            let mut col = 0;
            if include_constant {
                x[[r, col]] = 1.0;
                col += 1;
            }
            for i in 1..=p {
                x[[r, col]] = w[t - i];
                col += 1;
            }
            if let Some((_, e)) = &innovations {
                for j in 1..=q {
                    x[[r, col]] = e[t - j];
                    col += 1;
                }
            }
            y[r] = w[t];
        }

        let beta = least_squares(&x, &y)?;
        let offset = usize::from(include_constant);
        let constant = if include_constant { beta[0] } else { 0.0 };
        let ar = beta.iter().skip(offset).take(p).copied().collect::<Vec<_>>();
        let ma = beta.iter().skip(offset + p).take(q).copied().collect::<Vec<_>>();
        (constant, ar, ma)
    };

    // Sufficient condition for invertibility; keeps the residual recursion bounded
    if ma.iter().map(|t| t.abs()).sum::<f64>() >= 1.0 {
        return None;
    }

    // Conditional residuals with pre-sample innovations at zero
    let mut residuals = vec![0.0; n];
    for t in p..n {
        let mut fitted = constant;
        for (i, phi) in ar.iter().enumerate() {
            fitted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                fitted += theta * residuals[t - 1 - j];
            }
        }
        residuals[t] = w[t] - fitted;
    }

    let window = &residuals[eval_start.max(p)..];
    if window.is_empty() || window.iter().any(|r| !r.is_finite()) {
        return None;
    }

    let n_eff = window.len() as f64;
    let sigma2 = (window.iter().map(|r| r * r).sum::<f64>() / n_eff).max(VARIANCE_FLOOR);
    let aic = n_eff * sigma2.ln() + 2.0 * (k as f64 + 1.0);

    Some(ArmaFit {
        constant,
        ar,
        ma,
        residuals,
        sigma2,
        aic,
    })
}

/// Intercept followed by `m` lag coefficients.
fn ols_autoregression(w: &[f64], m: usize) -> Option<Array1<f64>> {
    let rows = w.len().checked_sub(m)?;
    let mut x = Array2::<f64>::zeros((rows, m + 1));
    let mut y = Array1::<f64>::zeros(rows);
    for (r, t) in (m..w.len()).enumerate() {
        x[[r, 0]] = 1.0;
        for i in 1..=m {
            x[[r, i]] = w[t - i];
        }
        y[r] = w[t];
    }
    least_squares(&x, &y)
}

/// Solves the normal equations with a tiny ridge so collinear designs (for
/// example a constant series) still have a solution.
fn least_squares(x: &Array2<f64>, y: &Array1<f64>) -> Option<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    let xty = x.t().dot(y);

    let k = xtx.nrows();
    let scale = (0..k).map(|i| xtx[[i, i]].abs()).fold(0.0_f64, f64::max).max(1.0);
    for i in 0..k {
        xtx[[i, i]] += 1e-10 * scale;
    }

    solve(xtx, xty)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        if a[[pivot, col]].abs() < 1e-300 {
            return None;
        }
        if pivot != col {
            for c in 0..n {
                a.swap([col, c], [pivot, c]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[[row, c]] -= factor * a[[col, c]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for c in row + 1..n {
            acc -= a[[row, c]] * x[c];
        }
        x[row] = acc / a[[row, row]];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// KPSS statistic for level stationarity, Bartlett window with
/// `trunc(3·√n / 13)` lags.
pub fn kpss_statistic(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let mean = x.iter().sum::<f64>() / nf;
    let e: Vec<f64> = x.iter().map(|v| v - mean).collect();

    let mut partial = 0.0;
    let mut eta = 0.0;
    for v in &e {
        partial += v;
        eta += partial * partial;
    }
    eta /= nf * nf;

    let lags = (3.0 * nf.sqrt() / 13.0) as usize;
    let mut s2 = e.iter().map(|v| v * v).sum::<f64>() / nf;
    for l in 1..=lags.min(n - 1) {
        let weight = 1.0 - l as f64 / (lags as f64 + 1.0);
        let cov = (l..n).map(|t| e[t] * e[t - l]).sum::<f64>() / nf;
        s2 += 2.0 * weight * cov;
    }

    if s2 <= VARIANCE_FLOOR {
        0.0
    } else {
        eta / s2
    }
}

fn is_level_stationary(x: &[f64]) -> bool {
    kpss_statistic(x) < KPSS_CRITICAL_5PCT
}

fn difference(x: &[f64]) -> Vec<f64> {
    x.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Undo differencing, innermost level first.
fn integrate(mut values: Vec<f64>, level_tails: &[f64]) -> Vec<f64> {
    for tail in level_tails.iter().rev() {
        let mut acc = *tail;
        for v in values.iter_mut() {
            acc += *v;
            *v = acc;
        }
    }
    values
}
