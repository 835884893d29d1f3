use std::path::Path;

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use log::{debug, info};

use crate::data::model::{guess_value, Column, Dataset, Value};
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// Delimiter sniffing
// ---------------------------------------------------------------------------

/// Candidate delimiters, in tie-break order.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// How many leading bytes the sniffer samples.
const SNIFF_BYTES: usize = 4096;

/// Count candidate occurrences in the sample and pick the maximum.
/// Ties (including the all-zero case) resolve to the earliest candidate.
pub fn detect_delimiter(sample: &[u8]) -> u8 {
    let mut best = DELIMITER_CANDIDATES[0];
    let mut best_count = 0usize;
    for &candidate in &DELIMITER_CANDIDATES {
        let count = sample.iter().filter(|&&b| b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// TabularFileLoader – delimited text ingress/egress
// ---------------------------------------------------------------------------

/// Loads delimited text files into [`Dataset`]s and writes them back.
///
/// `load` is idempotent and side-effect free; each call re-reads the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularFileLoader {
    /// Fixed delimiter; `None` enables auto-detection on load.
    delimiter: Option<u8>,
}

impl TabularFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(delimiter: u8) -> Self {
        TabularFileLoader {
            delimiter: Some(delimiter),
        }
    }

    /// Load a delimited file. Cell types are guessed per field.
    ///
    /// Errors: [`DataError::NotFound`] when the path does not exist,
    /// [`DataError::EmptyData`] when the file has zero parseable rows,
    /// [`DataError::Parse`] on malformed structure.
    pub fn load(&self, path: &Path) -> Result<Dataset> {
        if !path.exists() {
            return Err(DataError::NotFound(path.display().to_string()));
        }
        let bytes = std::fs::read(path)
            .map_err(|e| DataError::Parse(format!("reading {}: {e}", path.display())))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(DataError::EmptyData(path.display().to_string()));
        }

        let delimiter = self.delimiter.unwrap_or_else(|| {
            let sample = &bytes[..bytes.len().min(SNIFF_BYTES)];
            let d = detect_delimiter(sample);
            debug!("detected delimiter {:?} for {}", d as char, path.display());
            d
        });

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(bytes.as_slice());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| DataError::Parse(format!("reading headers: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        // `csv` silently skips blank records; track line positions and
        // restore each skipped line as an all-null row.
        let mut expected_line = reader.position().line();
        let mut values: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
        for result in reader.records() {
            let record =
                result.map_err(|e| DataError::Parse(format!("line {expected_line}: {e}")))?;
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(expected_line);
            for _ in expected_line..line {
                for column in values.iter_mut() {
                    column.push(Value::Null);
                }
            }
            if record.len() != headers.len() {
                return Err(DataError::Parse(format!(
                    "line {line}: has {} fields, expected {}",
                    record.len(),
                    headers.len()
                )));
            }
            for (col_idx, field) in record.iter().enumerate() {
                values[col_idx].push(guess_value(field.trim()));
            }
            expected_line = line + 1;
        }

        if values.first().map(Vec::is_empty).unwrap_or(true) {
            return Err(DataError::EmptyData(path.display().to_string()));
        }

        let columns: Vec<Column> = headers
            .into_iter()
            .zip(values)
            .map(|(name, vals)| Column::new(name, vals))
            .collect();
        let dataset = Dataset::from_columns(columns)?;

        info!(
            "loaded {} rows x {} columns from {}",
            dataset.row_count(),
            dataset.column_count(),
            path.display()
        );
        Ok(dataset)
    }

    /// Write a dataset back to a delimited file, preserving column order.
    /// A 0-based `index` column is persisted only when `write_index` is set.
    ///
    /// Every field is quoted so a null row in a single-column dataset is
    /// written as `""` rather than a blank line, which `load` could not
    /// tell apart from no line at all.
    pub fn save(&self, dataset: &Dataset, path: &Path, write_index: bool) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter.unwrap_or(b','))
            .quote_style(QuoteStyle::Always)
            .from_path(path)
            .map_err(|e| DataError::Runtime(anyhow::Error::new(e)))?;

        let mut header: Vec<String> = Vec::new();
        if write_index {
            header.push("index".to_string());
        }
        header.extend(dataset.column_names());
        writer
            .write_record(&header)
            .map_err(|e| DataError::Runtime(anyhow::Error::new(e)))?;

        for row in 0..dataset.row_count() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if write_index {
                record.push(row.to_string());
            }
            for col in dataset.columns() {
                record.push(match &col.values[row] {
                    Value::Null => String::new(),
                    other => other.to_string(),
                });
            }
            writer
                .write_record(&record)
                .map_err(|e| DataError::Runtime(anyhow::Error::new(e)))?;
        }
        writer
            .flush()
            .map_err(|e| DataError::Runtime(anyhow::Error::new(e)))?;

        info!(
            "wrote {} rows x {} columns to {}",
            dataset.row_count(),
            dataset.column_count(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::ColumnType;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn detects_the_dominant_delimiter() {
        assert_eq!(detect_delimiter(b"a;b;c\n1;2;3\n"), b';');
        assert_eq!(detect_delimiter(b"a\tb\tc\n"), b'\t');
        assert_eq!(detect_delimiter(b"a|b|c\n"), b'|');
    }

    #[test]
    fn delimiter_ties_resolve_in_declaration_order() {
        // one comma, one semicolon: comma wins
        assert_eq!(detect_delimiter(b"a,b;c\n"), b',');
        // no candidate at all: comma by default
        assert_eq!(detect_delimiter(b"abc\n"), b',');
    }

    #[test]
    fn loads_a_semicolon_file_with_guessed_types() {
        let file = write_temp("name;amount;flag\nwidget;1.5;true\ngadget;2;false\n");
        let ds = TabularFileLoader::new().load(file.path()).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column("name").unwrap().dtype, ColumnType::Text);
        assert_eq!(ds.column("amount").unwrap().dtype, ColumnType::Float);
        assert_eq!(ds.column("flag").unwrap().dtype, ColumnType::Boolean);
    }

    #[test]
    fn missing_path_is_not_found() {
        let err = TabularFileLoader::new()
            .load(Path::new("/definitely/not/here.csv"))
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[test]
    fn header_only_file_is_empty_data() {
        let file = write_temp("a,b,c\n");
        let err = TabularFileLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, DataError::EmptyData(_)));
    }

    #[test]
    fn blank_file_is_empty_data() {
        let file = write_temp("\n  \n");
        let err = TabularFileLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, DataError::EmptyData(_)));
    }

    #[test]
    fn ragged_row_is_a_parse_error() {
        let file = write_temp("a,b\n1,2\n3\n");
        let err = TabularFileLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, DataError::Parse(_)));
    }

    #[test]
    fn save_preserves_column_order_and_skips_index_by_default() {
        let file = write_temp("b,a\n1,x\n2,y\n");
        let loader = TabularFileLoader::new();
        let ds = loader.load(file.path()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        loader.save(&ds, &out, false).unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("\"b\",\"a\"\n"));

        loader.save(&ds, &out, true).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("\"index\",\"b\",\"a\"\n"));
    }

    #[test]
    fn blank_lines_load_as_null_rows() {
        let file = write_temp("a\n1.5\n\n2.5\n");
        let ds = TabularFileLoader::new().load(file.path()).unwrap();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column("a").unwrap().values[1], Value::Null);
        assert_eq!(ds.column("a").unwrap().null_count(), 1);

        // Multi-column files get a full null row back.
        let file = write_temp("a,b\n1,2\n\n3,4\n");
        let ds = TabularFileLoader::new().load(file.path()).unwrap();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.column("a").unwrap().values[1], Value::Null);
        assert_eq!(ds.column("b").unwrap().values[1], Value::Null);
    }

    #[test]
    fn single_column_nulls_survive_a_round_trip() {
        let ds = Dataset::from_columns(vec![Column::new(
            "a",
            vec![Value::Float(1.5), Value::Null, Value::Float(2.5)],
        )])
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("single.csv");
        let loader = TabularFileLoader::new();
        loader.save(&ds, &out, false).unwrap();

        let reloaded = loader.load(&out).unwrap();
        assert_eq!(reloaded.row_count(), 3);
        assert_eq!(reloaded.column("a").unwrap().values[1], Value::Null);
    }

    #[test]
    fn nulls_round_trip_as_empty_fields() {
        let file = write_temp("a,b\n1,\n,2\n");
        let loader = TabularFileLoader::new();
        let ds = loader.load(file.path()).unwrap();
        assert_eq!(ds.column("a").unwrap().null_count(), 1);
        assert_eq!(ds.column("b").unwrap().null_count(), 1);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nulls.csv");
        loader.save(&ds, &out, false).unwrap();
        let reloaded = loader.load(&out).unwrap();
        assert_eq!(reloaded.column("a").unwrap().null_count(), 1);
    }
}
