use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One calendar week, the time-series granularity.
/// Internally the Monday of the ISO week, so periods order and compare
/// the same way the underlying dates do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(NaiveDate);

impl Period {
    pub fn from_year_week(year: i32, week: u32) -> Option<Period> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(Period)
    }

    /// Snap an arbitrary date to the Monday of its ISO week.
    pub fn from_date(date: NaiveDate) -> Period {
        let offset = date.weekday().num_days_from_monday() as i64;
        Period(date - Duration::days(offset))
    }

    pub fn next(self) -> Period {
        Period(self.0 + Duration::weeks(1))
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn label(&self) -> String {
        let iso = self.0.iso_week();
        format!("{}-W{}", iso.year(), iso.week())
    }
}

/// One purchase row as loaded from the input file. Several rows may share
/// the same (year, week); aggregation merges them.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub year: i32,
    pub week: u32,
    pub quantity: f64,
    pub unit_price: f64,
    pub category: Option<String>,
    /// Values for the exogenous regressor columns, in `Dataset::regressor_names`
    /// order. `None` where the cell was empty or unparseable.
    pub regressors: Vec<Option<f64>>,
}

/// Everything loaded from one input file.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<RawRecord>,
    pub regressor_names: Vec<String>,
    /// Distinct categories in first-seen order; empty when the file has no
    /// `Categoria` column.
    pub categories: Vec<String>,
}

/// Weighted-average price per period, strictly unique and ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    points: Vec<(Period, f64)>,
}

impl AggregatedSeries {
    /// `points` must already be sorted by period with no duplicates; the
    /// aggregator builds them from an ordered map so this holds by
    /// construction.
    pub(crate) fn from_sorted(points: Vec<(Period, f64)>) -> AggregatedSeries {
        AggregatedSeries { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(Period, f64)] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn last_period(&self) -> Option<Period> {
        self.points.last().map(|(p, _)| *p)
    }

    /// The trailing `n` periods (the whole series when `n` covers it).
    pub fn tail(&self, n: usize) -> AggregatedSeries {
        let start = self.points.len().saturating_sub(n);
        AggregatedSeries {
            points: self.points[start..].to_vec(),
        }
    }
}

/// Per-period values of the exogenous regressor columns.
#[derive(Debug, Clone, Default)]
pub struct ExogenousTable {
    pub names: Vec<String>,
    /// Period -> one value per regressor, `names` order.
    pub rows: BTreeMap<Period, Vec<f64>>,
}

/// Deterministic trend options offered to the model-selection routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendSpec {
    None,
    Constant,
    Linear,
    ConstantLinear,
}

impl TrendSpec {
    pub const ALL: [TrendSpec; 4] = [
        TrendSpec::None,
        TrendSpec::Constant,
        TrendSpec::Linear,
        TrendSpec::ConstantLinear,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TrendSpec::None => "None",
            TrendSpec::Constant => "Constant",
            TrendSpec::Linear => "Linear",
            TrendSpec::ConstantLinear => "Constant + Linear",
        }
    }
}

/// User-chosen knobs for one forecast run.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub seasonal: bool,
    pub trend: TrendSpec,
    /// Restrict fitting to the trailing N periods; `None` = full series.
    pub sample_window: Option<usize>,
    pub horizon: usize,
    /// Confidence level for the secondary band, strictly inside (0, 1).
    pub alt_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

/// One forecast step.
#[derive(Debug, Clone)]
pub struct ForecastRow {
    pub period: Period,
    pub point: f64,
    pub band_95: Band,
    pub band_alt: Band,
}

/// Result of a forecast run: the table rows, a human-readable description
/// of the selected model, and any non-fatal warnings raised along the way.
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub rows: Vec<ForecastRow>,
    pub model_summary: String,
    pub warnings: Vec<String>,
    pub exogenous_used: bool,
    /// The secondary confidence level the bands were rescaled to.
    pub alt_level: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_year_week_is_monday() {
        let p = Period::from_year_week(2024, 1).unwrap();
        assert_eq!(p.date().weekday(), Weekday::Mon);
        assert_eq!(p.label(), "2024-W1");
    }

    #[test]
    fn period_rejects_invalid_week() {
        assert!(Period::from_year_week(2024, 0).is_none());
        assert!(Period::from_year_week(2024, 54).is_none());
    }

    #[test]
    fn next_period_is_seven_days_later() {
        let p = Period::from_year_week(2024, 10).unwrap();
        let n = p.next();
        assert_eq!((n.date() - p.date()).num_days(), 7);
        assert!(n > p);
    }

    #[test]
    fn from_date_snaps_to_week_start() {
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let p = Period::from_date(thursday);
        assert_eq!(p.date().weekday(), Weekday::Mon);
        assert!(p.date() <= thursday);
    }

    #[test]
    fn tail_keeps_trailing_periods() {
        let points: Vec<(Period, f64)> = (1..=10)
            .map(|w| (Period::from_year_week(2024, w).unwrap(), w as f64))
            .collect();
        let series = AggregatedSeries::from_sorted(points);
        let tail = series.tail(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.values(), vec![8.0, 9.0, 10.0]);
        assert_eq!(series.tail(100).len(), 10);
    }
}
