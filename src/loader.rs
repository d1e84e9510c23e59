//! CSV ingest with a strict schema for the required columns.
//!
//! Required headers: `Año, Semana, Cantidad_Reses, Precio_Planta`.
//! `Categoria` is optional; any further column is treated as an exogenous
//! regressor. Missing required columns fail before any aggregation runs.

use std::fs::File;
use std::io::Read;

use csv::StringRecord;
use tracing::info;

use crate::error::{AppError, Result};
use crate::model::{Dataset, RawRecord};

pub const COL_YEAR: &str = "Año";
pub const COL_WEEK: &str = "Semana";
pub const COL_QUANTITY: &str = "Cantidad_Reses";
pub const COL_PRICE: &str = "Precio_Planta";
pub const COL_CATEGORY: &str = "Categoria";

pub fn load_dataset(path: &str) -> Result<Dataset> {
    let file = File::open(path)
        .map_err(|e| AppError::DataValidation(format!("cannot open {path}: {e}")))?;
    let dataset = read_dataset(file)?;
    info!(
        path,
        records = dataset.records.len(),
        categories = dataset.categories.len(),
        regressors = dataset.regressor_names.len(),
        "dataset loaded"
    );
    Ok(dataset)
}

pub fn read_dataset<R: Read>(input: R) -> Result<Dataset> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| AppError::DataValidation(format!("cannot read header row: {e}")))?
        .clone();

    let year_col = require_column(&headers, COL_YEAR)?;
    let week_col = require_column(&headers, COL_WEEK)?;
    let quantity_col = require_column(&headers, COL_QUANTITY)?;
    let price_col = require_column(&headers, COL_PRICE)?;
    let category_col = headers.iter().position(|h| h == COL_CATEGORY);

    // Everything else is an exogenous regressor column.
    let mut known = vec![year_col, week_col, quantity_col, price_col];
    known.extend(category_col);
    let regressor_cols: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !known.contains(i))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut records = Vec::new();
    let mut categories: Vec<String> = Vec::new();

    for (row_idx, row) in reader.records().enumerate() {
        let line = row_idx + 2; // header is line 1
        let row =
            row.map_err(|e| AppError::DataValidation(format!("line {line}: {e}")))?;

        let year: i32 = parse_field(&row, year_col, COL_YEAR, line)?;
        let week: u32 = parse_field(&row, week_col, COL_WEEK, line)?;
        let quantity: f64 = parse_field(&row, quantity_col, COL_QUANTITY, line)?;
        let unit_price: f64 = parse_field(&row, price_col, COL_PRICE, line)?;

        if quantity <= 0.0 {
            return Err(AppError::DataValidation(format!(
                "line {line}: {COL_QUANTITY} must be positive, got {quantity}"
            )));
        }

        let category = category_col
            .and_then(|c| row.get(c))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        if let Some(cat) = &category {
            if !categories.contains(cat) {
                categories.push(cat.clone());
            }
        }

        // Regressor cells are lenient: an empty or unparseable cell is just
        // an absent value and is handled downstream during alignment.
        let regressors = regressor_cols
            .iter()
            .map(|(col, _)| {
                row.get(*col)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .and_then(|s| s.parse::<f64>().ok())
            })
            .collect();

        records.push(RawRecord {
            year,
            week,
            quantity,
            unit_price,
            category,
            regressors,
        });
    }

    Ok(Dataset {
        records,
        regressor_names: regressor_cols.into_iter().map(|(_, name)| name).collect(),
        categories,
    })
}

fn require_column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AppError::DataValidation(format!("missing required column {name}")))
}

fn parse_field<T: std::str::FromStr>(
    row: &StringRecord,
    col: usize,
    name: &str,
    line: usize,
) -> Result<T> {
    let raw = row
        .get(col)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::DataValidation(format!("line {line}: empty {name}")))?;
    raw.parse().map_err(|_| {
        AppError::DataValidation(format!("line {line}: cannot parse {name} from {raw:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_required_columns() {
        let csv = "Año,Semana,Cantidad_Reses,Precio_Planta\n\
                   2024,1,10,100\n\
                   2024,1,5,80\n";
        let ds = read_dataset(csv.as_bytes()).unwrap();
        assert_eq!(ds.records.len(), 2);
        assert!(ds.categories.is_empty());
        assert!(ds.regressor_names.is_empty());
        assert_eq!(ds.records[0].year, 2024);
        assert_eq!(ds.records[1].quantity, 5.0);
    }

    #[test]
    fn missing_price_column_fails_before_aggregation() {
        let csv = "Año,Semana,Cantidad_Reses\n2024,1,10\n";
        let err = read_dataset(csv.as_bytes()).unwrap_err();
        match err {
            AppError::DataValidation(msg) => assert!(msg.contains(COL_PRICE)),
            other => panic!("expected DataValidation, got {other:?}"),
        }
    }

    #[test]
    fn collects_categories_in_first_seen_order() {
        let csv = "Año,Semana,Cantidad_Reses,Precio_Planta,Categoria\n\
                   2024,1,10,100,Novillo\n\
                   2024,2,5,80,Vaca\n\
                   2024,3,5,80,Novillo\n";
        let ds = read_dataset(csv.as_bytes()).unwrap();
        assert_eq!(ds.categories, vec!["Novillo", "Vaca"]);
        assert_eq!(ds.records[0].category.as_deref(), Some("Novillo"));
    }

    #[test]
    fn extra_columns_become_regressors() {
        let csv = "Año,Semana,Cantidad_Reses,Precio_Planta,Lluvia_mm\n\
                   2024,1,10,100,12.5\n\
                   2024,2,5,80,\n";
        let ds = read_dataset(csv.as_bytes()).unwrap();
        assert_eq!(ds.regressor_names, vec!["Lluvia_mm"]);
        assert_eq!(ds.records[0].regressors, vec![Some(12.5)]);
        assert_eq!(ds.records[1].regressors, vec![None]);
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let csv = "Año,Semana,Cantidad_Reses,Precio_Planta\n2024,1,0,100\n";
        assert!(matches!(
            read_dataset(csv.as_bytes()).unwrap_err(),
            AppError::DataValidation(_)
        ));
    }

    #[test]
    fn malformed_numeric_cell_is_rejected() {
        let csv = "Año,Semana,Cantidad_Reses,Precio_Planta\n2024,uno,10,100\n";
        assert!(matches!(
            read_dataset(csv.as_bytes()).unwrap_err(),
            AppError::DataValidation(_)
        ));
    }
}
