// External crates
use anyhow::{Context, Result};
use polars::prelude::*;
use rustalib::util::file_utils::read_financial_data;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::lstm::step_1_dataset::SymbolSeries;

/// Errors raised while turning files into price series.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no close column found in {0}")]
    MissingClose(String),
    #[error("empty price series in {0}")]
    EmptySeries(String),
}

/// Standardize column names to lowercase canonical forms.
///
/// Handles capitalized headers and the common abbreviations seen in
/// downloaded OHLCV files; columns that match no known alias are left
/// untouched.
pub fn standardize_columns(df: &mut DataFrame) -> PolarsResult<()> {
    let renames: Vec<(String, &'static str)> = df
        .get_column_names()
        .iter()
        .filter_map(|name| {
            let lower = name.to_lowercase();
            let standard = match lower.as_str() {
                "open" | "o" | "openprice" | "open_price" => "open",
                "high" | "h" | "highprice" | "high_price" => "high",
                "low" | "l" | "lowprice" | "low_price" => "low",
                "close" | "c" | "cl" | "closeprice" | "close_price" => "close",
                "adj close" | "adj_close" | "adjusted close" | "adjusted_close" | "adjclose" => {
                    "adjusted_close"
                }
                "volume" | "vol" | "v" | "volumes" => "volume",
                "timestamp" | "time" | "date" | "t" | "datetime" | "dt" | "day" => "time",
                _ => return None,
            };
            if name.as_str() != standard {
                Some((name.to_string(), standard))
            } else {
                None
            }
        })
        .collect();

    for (old, new) in renames {
        df.rename(&old, new.into())?;
    }
    // `DataFrame::rename` mutates the columns in place but leaves the cached
    // schema (populated by its internal duplicate check) stale, so
    // `df.schema()` would still report the pre-rename names. Flush it.
    df.clear_schema();
    Ok(())
}

/// Read one symbol's OHLCV file into a DataFrame with standardized column
/// names, sorted by time when a time column is present.
pub fn load_symbol_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let display = path.as_ref().display().to_string();
    let path_str = path
        .as_ref()
        .to_str()
        .with_context(|| format!("Non-UTF8 path: {}", display))?;

    let (mut df, _columns) = read_financial_data(path_str)
        .with_context(|| format!("Failed to read {}", display))?;
    standardize_columns(&mut df).with_context(|| format!("Failed to standardize {}", display))?;

    if df.schema().contains("time") {
        df = df
            .sort(vec!["time"], SortMultipleOptions::default())
            .with_context(|| format!("Failed to sort {} by time", display))?;
    }

    if !df.schema().contains("close") {
        return Err(DataError::MissingClose(display).into());
    }
    Ok(df)
}

/// Extract the close column as a dense `f64` series, dropping nulls.
pub fn close_prices(df: &DataFrame, origin: &str) -> Result<Vec<f64>> {
    let column = df
        .column("close")
        .map_err(|_| DataError::MissingClose(origin.to_string()))?;
    let casted = column.cast(&DataType::Float64)?;
    let values = casted.f64()?;

    let closes: Vec<f64> = (0..values.len()).filter_map(|i| values.get(i)).collect();
    if closes.is_empty() {
        return Err(DataError::EmptySeries(origin.to_string()).into());
    }
    Ok(closes)
}

/// List the CSV files under a data directory, sorted by name.
///
/// `symbol_filter` keeps only the file whose stem matches it
/// (case-insensitively); `limit` caps how many symbols are taken.
pub fn list_symbol_files(
    dir: &Path,
    symbol_filter: Option<&str>,
    limit: Option<usize>,
) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .filter(|path| match symbol_filter {
            Some(symbol) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().eq_ignore_ascii_case(symbol))
                .unwrap_or(false),
            None => true,
        })
        .collect();
    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    Ok(files)
}

/// Load every selected symbol's close series from a data directory.
///
/// The symbol name is the file stem, uppercased. Fails when no file
/// survives the filter, since training needs at least one series.
pub fn load_symbols(
    dir: &Path,
    symbol_filter: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<SymbolSeries>> {
    let files = list_symbol_files(dir, symbol_filter, limit)
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    anyhow::ensure!(
        !files.is_empty(),
        "No symbol CSV files found in {}",
        dir.display()
    );

    let mut series = Vec::with_capacity(files.len());
    for file in files {
        let symbol = file
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_uppercase())
            .unwrap_or_default();
        let df = load_symbol_csv(&file)?;
        let closes = close_prices(&df, &file.display().to_string())?;
        log::debug!("loaded {} rows for {}", closes.len(), symbol);
        series.push(SymbolSeries { symbol, closes });
    }
    Ok(series)
}
