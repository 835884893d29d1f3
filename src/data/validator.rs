use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::model::{infer_dtype, parse_timestamp, ColumnType, Dataset, Value};
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// ValidationResult – per-column outcome reported to callers
// ---------------------------------------------------------------------------

/// Outcome of validating one column. Produced by
/// [`DataRepository::validate_column`](crate::data::repository::DataRepository::validate_column).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub column: String,
    pub expected_type: ColumnType,
    pub actual_type: ColumnType,
    pub null_count: usize,
    pub passed: bool,
    /// What was done (fill applied) or what would need doing (coercion
    /// failure detail). `None` when nothing was required.
    pub remediation: Option<String>,
}

/// Inclusive numeric bounds for a range check. Either side may be open.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeCheck {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeCheck {
    pub fn contains(&self, v: f64) -> bool {
        self.min.map(|m| v >= m).unwrap_or(true) && self.max.map(|m| v <= m).unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// SchemaValidator
// ---------------------------------------------------------------------------

/// Validates and coerces one dataset snapshot.
///
/// The validator takes a defensive copy at construction; coercion mutates
/// only that private copy, never the dataset it was built from. Coercion is
/// explicit and observable (counts, sample values) because silent type
/// coercion on ingested tabular data is the largest source of downstream
/// analysis errors.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    dataset: Dataset,
}

impl SchemaValidator {
    /// Bind a validator to a snapshot of the given dataset.
    pub fn new(dataset: &Dataset) -> Self {
        SchemaValidator {
            dataset: dataset.clone(),
        }
    }

    /// The validator's private (possibly coerced) copy.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Whether a column is present. Empty names are a caller bug.
    pub fn column_exists(&self, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Err(DataError::InvalidArgument(
                "column name must not be empty".to_string(),
            ));
        }
        Ok(self.dataset.column(name).is_some())
    }

    /// Null counts for the named columns.
    pub fn count_nulls(&self, columns: &[String]) -> Result<BTreeMap<String, usize>> {
        columns
            .iter()
            .map(|name| {
                let col = self
                    .dataset
                    .column(name)
                    .ok_or_else(|| DataError::UnknownColumn(name.clone()))?;
                Ok((name.clone(), col.null_count()))
            })
            .collect()
    }

    /// Coerce columns to the requested types, filling null/non-finite
    /// entries with `fill_values[column]` first where supplied.
    ///
    /// Fails with [`DataError::Validation`] naming the column and up to five
    /// offending samples when a value cannot be represented in the target
    /// type. On success only the validator's private copy is mutated.
    pub fn coerce_types(
        &mut self,
        column_types: &BTreeMap<String, ColumnType>,
        fill_values: Option<&BTreeMap<String, Value>>,
    ) -> Result<()> {
        // Convert everything first so a failure leaves the copy untouched.
        let mut coerced: Vec<(String, Vec<Value>)> = Vec::new();

        for (name, &target) in column_types {
            let col = self
                .dataset
                .column(name)
                .ok_or_else(|| DataError::UnknownColumn(name.clone()))?;

            let fill = fill_values
                .and_then(|m| m.get(name))
                .map(|v| convert_value(v, target))
                .transpose()
                .map_err(|sample| {
                    DataError::validation(
                        name.clone(),
                        format!("fill value is not coercible to {target}"),
                        vec![sample],
                    )
                })?;

            let mut values = Vec::with_capacity(col.len());
            let mut offending: Vec<String> = Vec::new();
            for v in &col.values {
                let v = match (&fill, v.is_missing()) {
                    (Some(f), true) => f,
                    _ => v,
                };
                match convert_value(v, target) {
                    Ok(converted) => values.push(converted),
                    Err(sample) => {
                        if offending.len() < 5 {
                            offending.push(sample);
                        }
                    }
                }
            }
            if !offending.is_empty() {
                return Err(DataError::validation(
                    name.clone(),
                    format!("{} values not coercible to {target}", col.len() - values.len()),
                    offending,
                ));
            }
            coerced.push((name.clone(), values));
        }

        for (name, values) in coerced {
            let target = column_types[&name];
            if let Some(col) = self.dataset.column_mut(&name) {
                col.values = values;
                // A fully-null column keeps its requested dtype.
                col.dtype = match infer_dtype(&col.values) {
                    ColumnType::Text if col.values.iter().all(Value::is_null) => target,
                    inferred => inferred,
                };
            }
        }
        Ok(())
    }

    /// Check numeric columns against inclusive bounds. Nulls are skipped.
    ///
    /// Fails with [`DataError::TypeMismatch`] on a non-numeric column and
    /// with [`DataError::Validation`] enumerating the out-of-range count
    /// per column otherwise.
    pub fn check_ranges(&self, ranges: &BTreeMap<String, RangeCheck>) -> Result<()> {
        let mut failures: Vec<(String, usize, Vec<String>)> = Vec::new();

        for (name, range) in ranges {
            let col = self
                .dataset
                .column(name)
                .ok_or_else(|| DataError::UnknownColumn(name.clone()))?;
            if !col.is_numeric() {
                return Err(DataError::TypeMismatch {
                    column: name.clone(),
                    dtype: col.dtype.to_string(),
                });
            }
            let mut count = 0usize;
            let mut examples: Vec<String> = Vec::new();
            for v in col.as_f64().into_iter().flatten() {
                if !range.contains(v) {
                    count += 1;
                    if examples.len() < 5 {
                        examples.push(v.to_string());
                    }
                }
            }
            if count > 0 {
                failures.push((name.clone(), count, examples));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        let columns: Vec<String> = failures.iter().map(|(n, _, _)| n.clone()).collect();
        let reason = failures
            .iter()
            .map(|(n, c, _)| format!("{n}: {c} out of range"))
            .collect::<Vec<_>>()
            .join(", ");
        let examples = failures.into_iter().flat_map(|(_, _, e)| e).collect();
        Err(DataError::validation(columns.join(", "), reason, examples))
    }

    /// Whether a column's values are unique, plus how many rows duplicate
    /// an earlier one. Nulls participate as a value of their own.
    pub fn check_uniqueness(&self, column: &str) -> Result<(bool, usize)> {
        let col = self
            .dataset
            .column(column)
            .ok_or_else(|| DataError::UnknownColumn(column.to_string()))?;
        let mut counts: BTreeMap<&Value, usize> = BTreeMap::new();
        for v in &col.values {
            *counts.entry(v).or_default() += 1;
        }
        let duplicates = col.len() - counts.len();
        Ok((duplicates == 0, duplicates))
    }
}

/// Convert one value into the target type. `Err` carries the offending
/// sample rendered for error messages. Nulls pass through untouched.
fn convert_value(v: &Value, target: ColumnType) -> std::result::Result<Value, String> {
    if v.is_null() {
        return Ok(Value::Null);
    }
    match target {
        ColumnType::Integer => match v {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            Value::Text(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| s.clone()),
            other => Err(other.to_string()),
        },
        ColumnType::Float => match v {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Bool(b) => Ok(Value::Float(*b as i64 as f64)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| s.clone()),
            other => Err(other.to_string()),
        },
        ColumnType::Boolean => match v {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Text(s) if s == "true" || s == "false" => Ok(Value::Bool(s == "true")),
            other => Err(other.to_string()),
        },
        ColumnType::Timestamp => match v {
            Value::Timestamp(t) => Ok(Value::Timestamp(t.clone())),
            Value::Text(s) => parse_timestamp(s).map(Value::Timestamp).ok_or_else(|| s.clone()),
            other => Err(other.to_string()),
        },
        ColumnType::Text => Ok(Value::Text(v.to_string())),
    }
}
