//! Polars helpers for turning loosely-typed tables into typed records
//!
//! Input tables come from several pipelines: Parquet files with Arrow list
//! columns and CSV files with pipe-separated strings. Everything here
//! tolerates missing columns and nulls; callers decide what is required.

use anyhow::{Context, Result};
use polars::prelude::*;
use std::path::Path;

/// Read a CSV or Parquet file (chosen by extension) into a DataFrame
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("parquet"));

    if is_parquet {
        LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to scan parquet: {:?}", path))?
            .collect()
            .with_context(|| format!("Failed to load parquet: {:?}", path))
    } else {
        CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.into()))
            .with_context(|| format!("Failed to create CSV reader: {:?}", path))?
            .finish()
            .with_context(|| format!("Failed to load CSV: {:?}", path))
    }
}

/// Fail with the available column names when a required column is missing
pub fn require_columns(df: &DataFrame, required: &[&str], what: &str) -> Result<()> {
    for &name in required {
        if df.column(name).is_err() {
            let available: Vec<String> = df
                .get_column_names()
                .into_iter()
                .map(|s| s.to_string())
                .collect();
            anyhow::bail!(
                "{}: missing required column '{}'. Available columns: {:?}",
                what,
                name,
                available
            );
        }
    }
    Ok(())
}

/// String values of a column, one per row (`None` for nulls or absent column)
pub fn string_values(df: &DataFrame, name: &str) -> Vec<Option<String>> {
    let height = df.height();
    let Ok(column) = df.column(name) else {
        return vec![None; height];
    };
    let Ok(cast) = column.cast(&DataType::String) else {
        return vec![None; height];
    };
    let Ok(strings) = cast.str() else {
        return vec![None; height];
    };
    strings
        .into_iter()
        .map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty() && *s != "NA")
                .map(str::to_string)
        })
        .collect()
}

/// Numeric values of a column cast to f64; non-finite values become `None`
pub fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    let height = df.height();
    let Ok(column) = df.column(name) else {
        return vec![None; height];
    };
    let Ok(cast) = column.cast(&DataType::Float64) else {
        return vec![None; height];
    };
    let Ok(values) = cast.f64() else {
        return vec![None; height];
    };
    values
        .into_iter()
        .map(|opt| opt.filter(|v| v.is_finite()))
        .collect()
}

/// First column among `names` that exists, read as f64
pub fn f64_values_first_of(df: &DataFrame, names: &[&str]) -> Vec<Option<f64>> {
    names
        .iter()
        .find(|name| df.column(name).is_ok())
        .map(|name| f64_values(df, name))
        .unwrap_or_else(|| vec![None; df.height()])
}

/// Membership flags from boolean or 0/1 columns; absent column means false
pub fn flag_values(df: &DataFrame, name: &str) -> Vec<bool> {
    let height = df.height();
    let Ok(column) = df.column(name) else {
        return vec![false; height];
    };
    if let Ok(bools) = column.bool() {
        return bools.into_iter().map(|opt| opt.unwrap_or(false)).collect();
    }
    f64_values(df, name)
        .into_iter()
        .map(|opt| opt.map_or(false, |v| v != 0.0))
        .collect()
}

/// Integer counts (nulls and absent column → 0)
pub fn count_values(df: &DataFrame, name: &str) -> Vec<u32> {
    f64_values(df, name)
        .into_iter()
        .map(|opt| opt.map_or(0, |v| v.max(0.0) as u32))
        .collect()
}

/// List-valued column, one Vec per row
///
/// Accepts Arrow list columns (Parquet) and pipe-separated strings (CSV).
/// An absent column yields empty lists.
pub fn list_values(df: &DataFrame, name: &str) -> Vec<Vec<String>> {
    let height = df.height();
    let Ok(column) = df.column(name) else {
        return vec![Vec::new(); height];
    };

    if let Ok(list_col) = column.list() {
        let mut rows = Vec::with_capacity(height);
        for idx in 0..height {
            let mut values = Vec::new();
            if let Some(list_series) = list_col.get_as_series(idx) {
                if let Ok(str_series) = list_series.cast(&DataType::String) {
                    if let Ok(strings) = str_series.str() {
                        for org in strings.into_iter().flatten() {
                            let org = org.trim();
                            if !org.is_empty() {
                                values.push(org.to_string());
                            }
                        }
                    }
                }
            }
            rows.push(values);
        }
        return rows;
    }

    string_values(df, name)
        .into_iter()
        .map(|opt| opt.map(|s| split_pipe(&s)).unwrap_or_default())
        .collect()
}

/// Split a pipe-separated list, dropping blanks
pub fn split_pipe(value: &str) -> Vec<String> {
    value
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
