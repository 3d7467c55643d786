//! Monthly passenger forecast.
//!
//! Additive model `y(t) = trend(t) + seasonal(t)`: a linear trend over scaled
//! time plus a yearly Fourier series, fitted by ridge least squares on the
//! absmax-scaled monthly sums. The fit is closed-form, so identical input and
//! configuration always produce the identical forecast.
//!
//! The penalized Gram matrix is Cholesky-factored once; the coefficients and
//! every point's leverage reuse that factor. With no residual degrees of
//! freedom (as many coefficients as months) the residual error is unknown and
//! interval bounds are `None`.

use std::f64::consts::PI;

use dispatch_domain::{FlightTable, ForecastPoint, MonthlyAggregate, YearMonth};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::aggregation::monthly_passengers;
use crate::config::ForecastConfig;
use crate::error::{AnalyticsError, Result};

const YEAR_DAYS: f64 = 365.25;
const MIN_HISTORY: usize = 2;

/// Which model terms were fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastMode {
    /// Trend plus yearly seasonality
    Seasonal,
    /// Too little history for seasonality; linear trend only
    TrendOnly,
}

/// Fitted monthly series and its projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub mode: ForecastMode,
    /// Fourier order actually used (0 for trend-only)
    pub fourier_order: usize,
    /// Observed monthly sums the model was fitted on
    pub observed: Vec<MonthlyAggregate>,
    /// In-sample fitted values, one per observed month
    pub history: Vec<ForecastPoint>,
    /// Projected months following the last observation
    pub future: Vec<ForecastPoint>,
    /// Residual standard error in passengers; `None` without residual
    /// degrees of freedom
    pub residual_std: Option<f64>,
}

/// Future point as shown to users: non-negative whole passengers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedPoint {
    /// Projected month
    pub period: YearMonth,
    /// Point forecast
    pub passengers: u64,
    /// Lower interval bound, when the interval is defined
    pub lower: Option<u64>,
    /// Upper interval bound, when the interval is defined
    pub upper: Option<u64>,
}

impl Forecast {
    /// Future points clipped at zero, then rounded, then cast.
    pub fn presented(&self) -> Vec<PresentedPoint> {
        self.future
            .iter()
            .map(|p| PresentedPoint {
                period: p.period,
                passengers: present(p.yhat),
                lower: p.yhat_lower.map(present),
                upper: p.yhat_upper.map(present),
            })
            .collect()
    }
}

fn present(value: f64) -> u64 {
    // NaN clips to 0 as well
    value.max(0.0).round() as u64
}

/// Design-matrix builder shared by the fit and the projection.
struct Design {
    origin: YearMonth,
    span_days: f64,
    order: usize,
}

impl Design {
    fn width(&self) -> usize {
        2 + 2 * self.order
    }

    fn days(&self, period: YearMonth) -> f64 {
        (period.first_day() - self.origin.first_day()).num_days() as f64
    }

    fn row(&self, period: YearMonth) -> DVector<f64> {
        let days = self.days(period);
        let mut row = Vec::with_capacity(self.width());
        row.push(1.0);
        row.push(days / self.span_days);
        for k in 1..=self.order {
            let angle = 2.0 * PI * k as f64 * days / YEAR_DAYS;
            row.push(angle.sin());
            row.push(angle.cos());
        }
        DVector::from_vec(row)
    }

    fn matrix(&self, periods: &[YearMonth]) -> DMatrix<f64> {
        let rows: Vec<DVector<f64>> = periods.iter().map(|&p| self.row(p)).collect();
        DMatrix::from_fn(rows.len(), self.width(), |i, j| rows[i][j])
    }
}

/// Fit the monthly passenger series of `table` and project `config.horizon`
/// months ahead.
pub fn forecast_passengers(table: &FlightTable, config: &ForecastConfig) -> Result<Forecast> {
    if table.is_empty() {
        return Err(AnalyticsError::EmptyFilterResult);
    }
    let observed = monthly_passengers(table)?;
    let n = observed.len();
    if n < MIN_HISTORY {
        return Err(AnalyticsError::InsufficientHistory {
            required: MIN_HISTORY,
            available: n,
        });
    }

    let order = if n >= config.min_seasonal_months {
        config.fourier_order.min((n - 2) / 2)
    } else {
        0
    };
    let mode = if order > 0 {
        ForecastMode::Seasonal
    } else {
        ForecastMode::TrendOnly
    };

    let origin = observed[0].month;
    let last = observed[n - 1].month;
    let design = Design {
        origin,
        span_days: ((last.first_day() - origin.first_day()).num_days() as f64).max(1.0),
        order,
    };

    let scale = observed
        .iter()
        .map(|m| m.value.abs())
        .fold(0.0_f64, f64::max);
    let scale = if scale > 0.0 { scale } else { 1.0 };

    let periods: Vec<YearMonth> = observed.iter().map(|m| m.month).collect();
    let x = design.matrix(&periods);
    let y = DVector::from_iterator(n, observed.iter().map(|m| m.value / scale));

    let p = design.width();
    let penalty = 1.0 / (config.seasonality_prior_scale * config.seasonality_prior_scale);
    let mut gram = x.transpose() * &x;
    for i in 2..p {
        gram[(i, i)] += penalty;
    }
    let factor = gram.cholesky().ok_or_else(|| {
        AnalyticsError::AnalysisFailed(format!(
            "normal equations are not positive definite ({n} months, {p} terms)"
        ))
    })?;
    let beta = factor.solve(&(x.transpose() * &y));

    let rss = (&y - &x * &beta).norm_squared();
    let dof = n.saturating_sub(p);
    let sigma = (dof > 0).then(|| (rss / dof as f64).sqrt());

    let z = Normal::new(0.0, 1.0)
        .map_err(|e| AnalyticsError::AnalysisFailed(e.to_string()))?
        .inverse_cdf(0.5 + config.interval_width.clamp(0.0, 0.999) / 2.0);

    let point = |period: YearMonth| -> ForecastPoint {
        let row = design.row(period);
        let trend = (beta[0] + beta[1] * row[1]) * scale;
        let seasonal = row.rows(2, p - 2).dot(&beta.rows(2, p - 2)) * scale;
        let yhat = trend + seasonal;
        let half_width = sigma.map(|sigma| {
            let leverage = row.dot(&factor.solve(&row));
            z * sigma * scale * (1.0 + leverage.max(0.0)).sqrt()
        });
        ForecastPoint {
            period,
            yhat,
            yhat_lower: half_width.map(|w| yhat - w),
            yhat_upper: half_width.map(|w| yhat + w),
            trend,
            seasonal,
        }
    };

    let history: Vec<ForecastPoint> = periods.iter().map(|&m| point(m)).collect();

    let mut future = Vec::with_capacity(config.horizon);
    let mut period = last;
    for _ in 0..config.horizon {
        period = period.succ();
        future.push(point(period));
    }

    tracing::debug!(
        months = n,
        ?mode,
        fourier_order = order,
        horizon = config.horizon,
        residual_std = ?sigma.map(|s| s * scale),
        "Fitted passenger forecast"
    );

    Ok(Forecast {
        mode,
        fourier_order: order,
        observed,
        history,
        future,
        residual_std: sigma.map(|s| s * scale),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Months, NaiveDate};
    use dispatch_domain::FlightRecord;

    fn monthly_table(start: NaiveDate, values: &[u32]) -> FlightTable {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let date = start + Months::new(i as u32);
                FlightRecord::new("SU100", date, "SU", "SVO", v)
            })
            .collect()
    }

    fn jan_2022() -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()
    }

    #[test]
    fn test_declining_series_is_presented_as_zero() {
        let table = monthly_table(jan_2022(), &[100, 60, 20, 0]);
        let forecast = forecast_passengers(&table, &ForecastConfig::default()).unwrap();

        assert_eq!(forecast.mode, ForecastMode::TrendOnly);
        assert_eq!(forecast.future.len(), 6);
        assert!(forecast.future.iter().all(|p| p.yhat < 0.0));
        for point in forecast.presented() {
            assert_eq!(point.passengers, 0);
            assert_eq!(point.lower, Some(0));
        }
    }

    #[test]
    fn test_future_periods_follow_last_month() {
        let table = monthly_table(jan_2022(), &[10, 20, 30]);
        let forecast = forecast_passengers(&table, &ForecastConfig::default()).unwrap();
        let periods: Vec<String> = forecast.future.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(
            periods,
            vec!["2022-04", "2022-05", "2022-06", "2022-07", "2022-08", "2022-09"]
        );
        assert_eq!(forecast.history.len(), 3);
    }

    #[test]
    fn test_seasonal_fit_tracks_yearly_cycle() {
        let values: Vec<u32> = (0..24)
            .map(|i| {
                let seasonal = 300.0 * (2.0 * PI * f64::from(i) / 12.0).sin();
                (1000.0 + 10.0 * f64::from(i) + seasonal).round() as u32
            })
            .collect();
        let table = monthly_table(jan_2022(), &values);
        let forecast = forecast_passengers(&table, &ForecastConfig::default()).unwrap();

        assert_eq!(forecast.mode, ForecastMode::Seasonal);
        assert_eq!(forecast.fourier_order, 3);
        for (fit, obs) in forecast.history.iter().zip(&forecast.observed) {
            assert!((fit.yhat - obs.value).abs() < 50.0);
            let (lower, upper) = (fit.yhat_lower.unwrap(), fit.yhat_upper.unwrap());
            assert!(lower <= fit.yhat && fit.yhat <= upper);
        }
    }

    #[test]
    fn test_forecast_is_deterministic() {
        let table = monthly_table(jan_2022(), &[5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987]);
        let a = forecast_passengers(&table, &ForecastConfig::default()).unwrap();
        let b = forecast_passengers(&table, &ForecastConfig::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_single_month_is_insufficient() {
        let table = monthly_table(jan_2022(), &[42]);
        let err = forecast_passengers(&table, &ForecastConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::InsufficientHistory {
                required: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn test_empty_table_is_reported() {
        let err = forecast_passengers(&FlightTable::default(), &ForecastConfig::default())
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::EmptyFilterResult));
    }

    #[test]
    fn test_two_months_leave_interval_undefined() {
        let table = monthly_table(jan_2022(), &[100, 140]);
        let forecast = forecast_passengers(&table, &ForecastConfig::default()).unwrap();

        assert_eq!(forecast.mode, ForecastMode::TrendOnly);
        assert_eq!(forecast.residual_std, None);
        assert_eq!(forecast.future.len(), 6);
        assert!(forecast.future[0].yhat > 140.0);
        for point in forecast.history.iter().chain(&forecast.future) {
            assert_eq!(point.yhat_lower, None);
            assert_eq!(point.yhat_upper, None);
        }
        assert!(forecast.presented().iter().all(|p| p.lower.is_none() && p.upper.is_none()));
    }

    #[test]
    fn test_interval_widens_beyond_history() {
        let table = monthly_table(jan_2022(), &[100, 130, 110, 150, 140]);
        let forecast = forecast_passengers(&table, &ForecastConfig::default()).unwrap();
        assert!(forecast.residual_std.unwrap() > 0.0);

        let width = |p: &ForecastPoint| p.yhat_upper.unwrap() - p.yhat_lower.unwrap();
        let widths: Vec<f64> = forecast.future.iter().map(width).collect();
        assert!(widths.windows(2).all(|w| w[1] > w[0]));
        assert!(widths[0] > width(&forecast.history[2]));
    }
}
