//! Aggregation of raw purchase rows into the canonical weekly price series.
//!
//! Several purchase lots land in the same week; the weekly price is the
//! quantity-weighted average of their unit prices. Duplicate period groups
//! are merged, never dropped.

use std::collections::BTreeMap;

use crate::error::{AppError, Result};
use crate::model::{AggregatedSeries, ExogenousTable, Period, RawRecord};

/// Combine per-lot rows into one weighted-average price per week.
///
/// Price per period = sum(quantity * unit_price) / sum(quantity) over every
/// row mapping to that period. A period whose total quantity is not positive
/// is an error; dividing through would silently produce an infinity.
pub fn aggregate(records: &[RawRecord]) -> Result<AggregatedSeries> {
    // (total quantity, total revenue) per period. The ordered map both merges
    // duplicate groups and yields the series already sorted.
    let mut groups: BTreeMap<Period, (f64, f64)> = BTreeMap::new();

    for rec in records {
        let period = Period::from_year_week(rec.year, rec.week).ok_or_else(|| {
            AppError::DataValidation(format!(
                "invalid year/week pair: {} week {}",
                rec.year, rec.week
            ))
        })?;
        let entry = groups.entry(period).or_insert((0.0, 0.0));
        entry.0 += rec.quantity;
        entry.1 += rec.quantity * rec.unit_price;
    }

    if groups.is_empty() {
        return Err(AppError::EmptyDataset);
    }

    let mut points = Vec::with_capacity(groups.len());
    for (period, (quantity, revenue)) in groups {
        if quantity <= 0.0 {
            return Err(AppError::DataValidation(format!(
                "period {} has non-positive total quantity",
                period.label()
            )));
        }
        points.push((period, revenue / quantity));
    }

    Ok(AggregatedSeries::from_sorted(points))
}

/// Build the per-period regressor table from the raw rows.
///
/// A period's regressor value is the plain mean over the rows that carry one;
/// rows with an empty cell contribute nothing. A period where every row is
/// missing a value simply has no entry, which the orchestrator later reports
/// as an alignment warning.
pub fn regressor_table(records: &[RawRecord], names: &[String]) -> ExogenousTable {
    let mut table = ExogenousTable {
        names: names.to_vec(),
        rows: BTreeMap::new(),
    };
    if names.is_empty() {
        return table;
    }

    // Per period: (sum, count) for each regressor column.
    let mut sums: BTreeMap<Period, Vec<(f64, usize)>> = BTreeMap::new();
    for rec in records {
        let Some(period) = Period::from_year_week(rec.year, rec.week) else {
            continue;
        };
        let entry = sums
            .entry(period)
            .or_insert_with(|| vec![(0.0, 0); names.len()]);
        for (i, value) in rec.regressors.iter().enumerate().take(names.len()) {
            if let Some(v) = value {
                entry[i].0 += v;
                entry[i].1 += 1;
            }
        }
    }

    for (period, cells) in sums {
        // Keep the period only when every regressor has at least one value.
        if cells.iter().all(|(_, n)| *n > 0) {
            let row = cells.iter().map(|(sum, n)| sum / *n as f64).collect();
            table.rows.insert(period, row);
        }
    }

    table
}
