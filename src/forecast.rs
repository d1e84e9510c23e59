//! Forecast orchestration: windowing, exogenous alignment, delegation to the
//! automatic model-selection library, and assembly of the output table.
//!
//! Model fitting itself is behind the [`AutoSelector`] seam. The production
//! implementation wraps the `augurs` crate: plain AutoETS for non-seasonal
//! runs, MSTL with a yearly (52-week) period plus an ETS trend model when the
//! seasonal option is on and the series is long enough.

use augurs::ets::AutoETS;
use augurs::mstl::MSTLModel;
use augurs::prelude::*;
use tracing::{debug, info, warn};

use crate::bands;
use crate::error::{AppError, Result};
use crate::model::{
    AggregatedSeries, Band, ExogenousTable, ForecastConfig, ForecastOutcome, ForecastRow,
    TrendSpec,
};

/// Weeks per seasonal cycle.
const SEASON_LENGTH: usize = 52;

/// Fitting options passed through to the model-selection routine.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub seasonal: bool,
    pub trend: TrendSpec,
}

/// Exogenous regressor columns aligned 1:1 with the fitted series.
#[derive(Debug, Clone)]
pub struct AlignedRegressors {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

/// Point forecasts plus the model's native 95% interval, one entry per step.
#[derive(Debug, Clone)]
pub struct ModelForecast {
    pub point: Vec<f64>,
    pub band_95: Vec<Band>,
}

/// A fitted model, consumed only through its forecast capability.
pub trait FittedModel {
    fn predict(&self, horizon: usize) -> Result<ModelForecast>;
    fn describe(&self) -> String;
}

/// The automatic model-selection routine.
pub trait AutoSelector {
    fn fit(
        &self,
        values: &[f64],
        exogenous: Option<&AlignedRegressors>,
        options: &FitOptions,
    ) -> Result<Box<dyn FittedModel>>;
}

/// Run one complete forecast: window, align, fit, predict, rescale.
pub fn run_forecast(
    series: &AggregatedSeries,
    exogenous: Option<&ExogenousTable>,
    config: &ForecastConfig,
    selector: &dyn AutoSelector,
) -> Result<ForecastOutcome> {
    if config.horizon == 0 {
        return Err(AppError::InvalidHorizon(config.horizon));
    }
    if series.is_empty() {
        return Err(AppError::EmptyDataset);
    }
    if !(config.alt_level > 0.0 && config.alt_level < 1.0) {
        return Err(AppError::DataValidation(format!(
            "confidence level must be inside (0, 1), got {}",
            config.alt_level
        )));
    }

    let windowed = match config.sample_window {
        Some(n) if n < series.len() => series.tail(n),
        _ => series.clone(),
    };

    // Alignment runs against the windowed index, so shrinking the sample
    // window re-validates the regressors.
    let mut warnings = Vec::new();
    let aligned = match exogenous {
        Some(table) if !table.names.is_empty() => {
            match align_regressors(&windowed, table) {
                Ok(aligned) => Some(aligned),
                Err(msg) => {
                    warn!(%msg, "exogenous regressors disabled for this run");
                    warnings.push(format!("Exogenous regressors disabled: {msg}"));
                    None
                }
            }
        }
        _ => None,
    };

    let values = windowed.values();
    let options = FitOptions {
        seasonal: config.seasonal,
        trend: config.trend,
    };
    let model = selector.fit(&values, aligned.as_ref(), &options)?;
    let forecast = model.predict(config.horizon)?;
    if forecast.point.len() < config.horizon || forecast.band_95.len() < config.horizon {
        return Err(AppError::ModelFit(format!(
            "model returned {} forecast steps, expected {}",
            forecast.point.len(),
            config.horizon
        )));
    }

    // The output index extends weekly from the last observed period.
    let mut period = windowed
        .last_period()
        .ok_or(AppError::EmptyDataset)?;
    let mut rows = Vec::with_capacity(config.horizon);
    for step in 0..config.horizon {
        period = period.next();
        let point = forecast.point[step];
        let band_95 = forecast.band_95[step];
        let band_alt = bands::rescale(point, band_95, config.alt_level);
        rows.push(ForecastRow {
            period,
            point,
            band_95,
            band_alt,
        });
    }

    info!(
        horizon = config.horizon,
        fitted_on = values.len(),
        exogenous = aligned.is_some(),
        "forecast complete"
    );

    Ok(ForecastOutcome {
        rows,
        model_summary: model.describe(),
        warnings,
        exogenous_used: aligned.is_some(),
        alt_level: config.alt_level,
    })
}

/// Align the regressor table to the series index. Any series period missing
/// from the table disables exogenous use for the run; table periods outside
/// the series are dropped silently.
fn align_regressors(
    series: &AggregatedSeries,
    table: &ExogenousTable,
) -> std::result::Result<AlignedRegressors, String> {
    let mut columns = vec![Vec::with_capacity(series.len()); table.names.len()];
    let mut missing = Vec::new();

    for (period, _) in series.points() {
        match table.rows.get(period) {
            Some(row) => {
                for (column, value) in columns.iter_mut().zip(row.iter()) {
                    column.push(*value);
                }
            }
            None => missing.push(period.label()),
        }
    }

    if missing.is_empty() {
        Ok(AlignedRegressors {
            names: table.names.clone(),
            columns,
        })
    } else {
        Err(format!(
            "{} of {} series periods have no regressor values (first: {})",
            missing.len(),
            series.len(),
            missing[0]
        ))
    }
}

/// Production selector backed by augurs.
#[derive(Debug, Default)]
pub struct AugursSelector;

/// Object-safe bridge over the concrete fitted types augurs hands back.
trait DynPredict {
    fn predict_level(
        &self,
        horizon: usize,
        level: f64,
    ) -> std::result::Result<augurs::Forecast, String>;
}

impl<P: Predict> DynPredict for P {
    fn predict_level(
        &self,
        horizon: usize,
        level: f64,
    ) -> std::result::Result<augurs::Forecast, String> {
        self.predict(horizon, level).map_err(|e| e.to_string())
    }
}

struct AugursModel {
    inner: Box<dyn DynPredict>,
    /// Constant exogenous contribution carried forward into the forecast.
    exog_carry: f64,
    summary: String,
}

impl FittedModel for AugursModel {
    fn predict(&self, horizon: usize) -> Result<ModelForecast> {
        let forecast = self
            .inner
            .predict_level(horizon, bands::NATIVE_LEVEL)
            .map_err(AppError::ModelFit)?;
        let intervals = forecast
            .intervals
            .ok_or_else(|| AppError::ModelFit("model returned no prediction intervals".into()))?;

        let point = forecast
            .point
            .iter()
            .map(|v| v + self.exog_carry)
            .collect();
        let band_95 = intervals
            .lower
            .iter()
            .zip(intervals.upper.iter())
            .map(|(low, high)| Band {
                low: low + self.exog_carry,
                high: high + self.exog_carry,
            })
            .collect();

        Ok(ModelForecast { point, band_95 })
    }

    fn describe(&self) -> String {
        self.summary.clone()
    }
}

impl AutoSelector for AugursSelector {
    fn fit(
        &self,
        values: &[f64],
        exogenous: Option<&AlignedRegressors>,
        options: &FitOptions,
    ) -> Result<Box<dyn FittedModel>> {
        let mut work = values.to_vec();
        let mut exog_carry = 0.0;
        let mut exog_note = String::new();
        if let Some(regressors) = exogenous {
            exog_carry = regress_out(&mut work, regressors);
            exog_note = format!(", adjusted for {}", regressors.names.join(", "));
        }

        let spec = ets_spec(options.trend);
        let seasonal_ok = options.seasonal && work.len() >= 2 * SEASON_LENGTH;
        if options.seasonal && !seasonal_ok {
            warn!(
                observations = work.len(),
                needed = 2 * SEASON_LENGTH,
                "series too short for seasonal decomposition, using plain AutoETS"
            );
        }

        debug!(
            seasonal = seasonal_ok,
            spec,
            observations = work.len(),
            "fitting model"
        );

        let (inner, kind): (Box<dyn DynPredict>, &str) = if seasonal_ok {
            let trend_model = AutoETS::new(1, spec)
                .map_err(|e| AppError::ModelFit(format!("ETS init: {e}")))?
                .into_trend_model();
            let mstl = MSTLModel::new(vec![SEASON_LENGTH], trend_model);
            let fitted = mstl
                .fit(&work)
                .map_err(|e| AppError::ModelFit(format!("MSTL fit: {e}")))?;
            (Box::new(fitted), "MSTL[52] + AutoETS")
        } else {
            let auto = AutoETS::new(1, spec)
                .map_err(|e| AppError::ModelFit(format!("ETS init: {e}")))?;
            let fitted = auto
                .fit(&work)
                .map_err(|e| AppError::ModelFit(format!("ETS fit: {e}")))?;
            (Box::new(fitted), "AutoETS")
        };

        let summary = format!(
            "{kind} ({spec}), fitted on {} weekly observations{exog_note}",
            work.len()
        );
        Ok(Box::new(AugursModel {
            inner,
            exog_carry,
            summary,
        }))
    }
}

/// Map the trend option onto an ETS specification. The ETS level component
/// already covers a constant term, so None and Constant coincide; Linear and
/// Constant+Linear both select an additive trend.
fn ets_spec(trend: TrendSpec) -> &'static str {
    match trend {
        TrendSpec::None | TrendSpec::Constant => "ZNN",
        TrendSpec::Linear | TrendSpec::ConstantLinear => "ZAN",
    }
}

/// Remove each regressor's least-squares projection from the series,
/// mean-preserving, and return the contribution at the last observation.
/// That contribution is held constant over the forecast horizon, since no
/// future regressor values exist.
fn regress_out(values: &mut [f64], regressors: &AlignedRegressors) -> f64 {
    let mut carry = 0.0;
    for column in &regressors.columns {
        let n = column.len() as f64;
        if n < 2.0 {
            continue;
        }
        let x_mean = column.iter().sum::<f64>() / n;
        let y_mean = values.iter().sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (x, y) in column.iter().zip(values.iter()) {
            numerator += (x - x_mean) * (y - y_mean);
            denominator += (x - x_mean) * (x - x_mean);
        }
        if denominator == 0.0 {
            continue;
        }
        let beta = numerator / denominator;

        for (y, x) in values.iter_mut().zip(column.iter()) {
            *y -= beta * (x - x_mean);
        }
        if let Some(last) = column.last() {
            carry += beta * (last - x_mean);
        }
    }
    carry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Period;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    fn weekly_series(n: u32, f: impl Fn(u32) -> f64) -> AggregatedSeries {
        let mut period = Period::from_year_week(2023, 1).unwrap();
        let mut points = Vec::new();
        for i in 0..n {
            points.push((period, f(i)));
            period = period.next();
        }
        AggregatedSeries::from_sorted(points)
    }

    fn config(horizon: usize) -> ForecastConfig {
        ForecastConfig {
            seasonal: false,
            trend: TrendSpec::Linear,
            sample_window: None,
            horizon,
            alt_level: 0.80,
        }
    }

    /// Selector that returns a flat forecast and records what it was given.
    #[derive(Default)]
    struct StubSelector {
        seen_len: RefCell<usize>,
        seen_exogenous: RefCell<bool>,
    }

    struct StubModel;

    impl FittedModel for StubModel {
        fn predict(&self, horizon: usize) -> Result<ModelForecast> {
            Ok(ModelForecast {
                point: vec![100.0; horizon],
                band_95: vec![Band { low: 90.0, high: 110.0 }; horizon],
            })
        }

        fn describe(&self) -> String {
            "stub".into()
        }
    }

    impl AutoSelector for StubSelector {
        fn fit(
            &self,
            values: &[f64],
            exogenous: Option<&AlignedRegressors>,
            _options: &FitOptions,
        ) -> Result<Box<dyn FittedModel>> {
            *self.seen_len.borrow_mut() = values.len();
            *self.seen_exogenous.borrow_mut() = exogenous.is_some();
            Ok(Box::new(StubModel))
        }
    }

    #[test]
    fn horizon_rows_with_weekly_increasing_periods() {
        let series = weekly_series(52, |i| 100.0 + i as f64);
        let outcome = run_forecast(&series, None, &config(5), &StubSelector::default()).unwrap();

        assert_eq!(outcome.rows.len(), 5);
        let last = series.last_period().unwrap();
        assert_eq!(outcome.rows[0].period, last.next());
        for pair in outcome.rows.windows(2) {
            assert_eq!(pair[1].period, pair[0].period.next());
        }
    }

    #[test]
    fn both_bands_are_centered_on_the_point() {
        let series = weekly_series(20, |_| 100.0);
        let outcome = run_forecast(&series, None, &config(3), &StubSelector::default()).unwrap();
        for row in &outcome.rows {
            assert!(((row.band_95.low + row.band_95.high) / 2.0 - row.point).abs() < 1e-9);
            assert!(((row.band_alt.low + row.band_alt.high) / 2.0 - row.point).abs() < 1e-9);
            assert!(row.band_alt.high - row.band_alt.low < row.band_95.high - row.band_95.low);
        }
    }

    #[test]
    fn zero_horizon_is_rejected() {
        let series = weekly_series(10, |_| 100.0);
        assert!(matches!(
            run_forecast(&series, None, &config(0), &StubSelector::default()).unwrap_err(),
            AppError::InvalidHorizon(0)
        ));
    }

    #[test]
    fn empty_series_is_rejected() {
        let series = AggregatedSeries::from_sorted(vec![]);
        assert!(matches!(
            run_forecast(&series, None, &config(5), &StubSelector::default()).unwrap_err(),
            AppError::EmptyDataset
        ));
    }

    #[test]
    fn sample_window_restricts_the_fit() {
        let series = weekly_series(52, |i| i as f64);
        let selector = StubSelector::default();
        let mut cfg = config(2);
        cfg.sample_window = Some(12);
        run_forecast(&series, None, &cfg, &selector).unwrap();
        assert_eq!(*selector.seen_len.borrow(), 12);
    }

    #[test]
    fn full_alignment_passes_regressors_through() {
        let series = weekly_series(10, |i| 100.0 + i as f64);
        let mut rows = BTreeMap::new();
        for (period, _) in series.points() {
            rows.insert(*period, vec![1.0]);
        }
        let table = ExogenousTable {
            names: vec!["Lluvia".into()],
            rows,
        };

        let selector = StubSelector::default();
        let outcome = run_forecast(&series, Some(&table), &config(2), &selector).unwrap();
        assert!(outcome.exogenous_used);
        assert!(outcome.warnings.is_empty());
        assert!(*selector.seen_exogenous.borrow());
    }

    #[test]
    fn partial_alignment_disables_regressors_with_warning() {
        let series = weekly_series(10, |i| 100.0 + i as f64);
        let mut rows = BTreeMap::new();
        // Cover all but the last two series periods.
        for (period, _) in &series.points()[..8] {
            rows.insert(*period, vec![1.0]);
        }
        let table = ExogenousTable {
            names: vec!["Lluvia".into()],
            rows,
        };

        let selector = StubSelector::default();
        let outcome = run_forecast(&series, Some(&table), &config(2), &selector).unwrap();
        assert!(!outcome.exogenous_used);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(!*selector.seen_exogenous.borrow());
    }

    #[test]
    fn windowing_revalidates_alignment() {
        // Regressors cover only the trailing 12 periods: full-series runs
        // must warn, windowed runs must not.
        let series = weekly_series(52, |i| 100.0 + i as f64);
        let mut rows = BTreeMap::new();
        for (period, _) in series.tail(12).points() {
            rows.insert(*period, vec![2.5]);
        }
        let table = ExogenousTable {
            names: vec!["Lluvia".into()],
            rows,
        };

        let full = run_forecast(&series, Some(&table), &config(2), &StubSelector::default())
            .unwrap();
        assert!(!full.exogenous_used);

        let mut cfg = config(2);
        cfg.sample_window = Some(12);
        let windowed =
            run_forecast(&series, Some(&table), &cfg, &StubSelector::default()).unwrap();
        assert!(windowed.exogenous_used);
    }

    #[test]
    fn augurs_selector_forecasts_a_trending_series() {
        let series = weekly_series(60, |i| 50.0 + 2.0 * i as f64);
        let outcome = run_forecast(&series, None, &config(5), &AugursSelector).unwrap();

        assert_eq!(outcome.rows.len(), 5);
        for row in &outcome.rows {
            assert!(row.point.is_finite());
            assert!(row.band_95.low <= row.point && row.point <= row.band_95.high);
        }
        assert!(outcome.model_summary.contains("AutoETS"));
    }

    #[test]
    fn seasonal_request_on_short_series_falls_back() {
        let series = weekly_series(30, |i| 100.0 + (i as f64 * 0.7).sin() * 5.0);
        let mut cfg = config(3);
        cfg.seasonal = true;
        let outcome = run_forecast(&series, None, &cfg, &AugursSelector).unwrap();
        assert_eq!(outcome.rows.len(), 3);
        assert!(outcome.model_summary.contains("AutoETS"));
    }

    #[test]
    fn regress_out_flattens_a_purely_exogenous_series() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let mut y: Vec<f64> = x.iter().map(|v| 10.0 + 3.0 * v).collect();
        let regressors = AlignedRegressors {
            names: vec!["x".into()],
            columns: vec![x],
        };
        let carry = regress_out(&mut y, &regressors);

        let mean = y.iter().sum::<f64>() / y.len() as f64;
        for v in &y {
            assert!((v - mean).abs() < 1e-9);
        }
        // Last x is above its mean, so the carried contribution is positive.
        assert!(carry > 0.0);
    }
}
