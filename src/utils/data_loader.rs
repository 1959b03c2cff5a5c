//! Data loading utilities

use crate::error::{TabregError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// Cells read as missing, matching the usual pandas defaults
pub const MISSING_VALUE_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Loader for delimited tables
pub struct DataLoader {
    /// Rows used to infer the schema
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: 1000,
        }
    }

    /// Set the number of rows used for schema inference
    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a delimited file with a header row
    pub fn load_csv_with_delimiter(&self, path: &Path, delimiter: u8) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            TabregError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let null_values = NullValues::AllColumns(
            MISSING_VALUE_TOKENS.iter().map(|token| PlSmallStr::from(*token)).collect(),
        );
        let parse_opts = CsvParseOptions::default()
            .with_separator(delimiter)
            .with_null_values(Some(null_values));

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| TabregError::DataError(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Load a comma-separated file
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        self.load_csv_with_delimiter(path, b',')
    }

    /// Pick the delimiter from the extension and load
    pub fn load_auto(&self, path: &Path) -> Result<DataFrame> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "tsv" | "tab" => self.load_csv_with_delimiter(path, b'\t'),
            _ => self.load_csv(path),
        }
    }
}

/// Write DataFrames to disk
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| TabregError::DataError(e.to_string()))
    }
}

/// Drop every row holding a null, or a NaN in a float column
pub fn drop_missing_rows(df: &DataFrame) -> Result<DataFrame> {
    let mut keep = vec![true; df.height()];

    for column in df.get_columns() {
        let series = column.as_materialized_series();
        let not_null = series.is_not_null();
        for (flag, valid) in keep.iter_mut().zip(not_null.into_iter()) {
            if valid != Some(true) {
                *flag = false;
            }
        }

        if series.dtype().is_float() {
            let values = series.cast(&DataType::Float64)?;
            for (flag, v) in keep.iter_mut().zip(values.f64()?.into_iter()) {
                if v.map_or(false, f64::is_nan) {
                    *flag = false;
                }
            }
        }
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Convert a numeric series into a dense vector.
///
/// Nulls and values that cannot be read as `f64` are rejected rather than
/// imputed.
pub fn series_to_array1(series: &Series) -> Result<Array1<f64>> {
    let cast = series
        .cast(&DataType::Float64)
        .map_err(|e| TabregError::DataError(format!("column '{}': {}", series.name(), e)))?;

    if cast.null_count() > 0 {
        return Err(TabregError::DataError(format!(
            "column '{}' contains missing or non-numeric values",
            series.name()
        )));
    }

    Ok(cast.f64()?.into_no_null_iter().collect())
}

/// Convert every column of a frame into a row-major feature matrix
pub fn frame_to_array2(df: &DataFrame) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Array1<f64>> = df
        .get_columns()
        .iter()
        .map(|column| series_to_array1(column.as_materialized_series()))
        .collect::<Result<Vec<_>>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_data.len()), |(r, c)| col_data[c][r]))
}

/// Column names of a frame as owned strings
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names().iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_tokens_read_as_null() {
        let tmp = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(tmp.as_file(), "id,a,target").unwrap();
        writeln!(tmp.as_file(), "1,0.5,3.0").unwrap();
        writeln!(tmp.as_file(), "2,NA,4.0").unwrap();
        writeln!(tmp.as_file(), "3,1.5,nan").unwrap();
        tmp.as_file().flush().unwrap();

        let df = DataLoader::new().load_csv(tmp.path()).unwrap();
        let a = df.column("a").unwrap();
        assert_eq!(a.dtype(), &DataType::Float64);
        assert_eq!(a.null_count(), 1);
        assert_eq!(df.column("target").unwrap().null_count(), 1);
    }

    #[test]
    fn test_load_csv() {
        let tmp = tempfile::NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(tmp.as_file(), "id,a,target").unwrap();
        writeln!(tmp.as_file(), "1,0.5,3.0").unwrap();
        writeln!(tmp.as_file(), "2,1.5,4.0").unwrap();
        tmp.as_file().flush().unwrap();

        let df = DataLoader::new().load_auto(tmp.path()).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(column_names(&df), vec!["id", "a", "target"]);
    }

    #[test]
    fn test_load_missing_file_is_data_error() {
        let result = DataLoader::new().load_csv(Path::new("/nonexistent/train.csv"));
        assert!(matches!(result, Err(TabregError::DataError(_))));
    }

    #[test]
    fn test_drop_missing_rows() {
        let df = df!(
            "a" => &[Some(1.0), None, Some(3.0), Some(f64::NAN)],
            "b" => &[Some("x"), Some("y"), None, Some("w")]
        )
        .unwrap();

        let cleaned = drop_missing_rows(&df).unwrap();
        assert_eq!(cleaned.height(), 1);
    }

    #[test]
    fn test_frame_to_array2_rejects_nulls() {
        let df = df!("a" => &[Some(1.0), None]).unwrap();
        assert!(matches!(frame_to_array2(&df), Err(TabregError::DataError(_))));
    }

    #[test]
    fn test_frame_to_array2_layout() {
        let df = df!("a" => &[1.0, 2.0], "b" => &[3i64, 4]).unwrap();
        let x = frame_to_array2(&df).unwrap();
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x[[1, 0]], 2.0);
        assert_eq!(x[[0, 1]], 3.0);
    }
}
