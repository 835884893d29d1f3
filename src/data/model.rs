use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// Value – a single cell of a dataset
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Values key `BTreeMap`s downstream (uniqueness counting, pie-slice
/// grouping) so `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// ISO-8601 timestamp kept as text for simplicity.
    Timestamp(String),
    Null,
}

// -- Manual Eq/Ord/Hash so we can put Value in BTreeSet/BTreeMap --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Int(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
                Timestamp(_) => 5,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) | (Timestamp(a), Timestamp(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) | Value::Timestamp(s) => s.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Timestamp(t) => write!(f, "{t}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl Value {
    /// Interpret the value as an `f64` where a numeric view makes sense.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Whether the value is the null sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or a numeric value that is NaN/infinite. These are the cells a
    /// coercion fill value applies to.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(v) => !v.is_finite(),
            _ => false,
        }
    }
}

/// Guess the type of a raw text field (CSV cells, untyped store fields).
pub fn guess_value(s: &str) -> Value {
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    if s == "true" || s == "false" {
        return Value::Bool(s == "true");
    }
    Value::Text(s.to_string())
}

/// Accepted datetime layouts: ISO-8601 date plus a `T`- or space-separated
/// time, with or without seconds.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Calendar-aware ISO-8601 check (`2024-02-31` is rejected). Returns the
/// trimmed text on success so timestamps keep their source representation.
pub fn parse_timestamp(s: &str) -> Option<String> {
    let s = s.trim();
    let valid = NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || DATETIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok());
    valid.then(|| s.to_string())
}

// ---------------------------------------------------------------------------
// ColumnType
// ---------------------------------------------------------------------------

/// Declared or inferred element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
        };
        write!(f, "{name}")
    }
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

/// Infer a column type from its values, ignoring nulls. Mixed integer/float
/// promotes to float; any other mix degrades to text.
pub fn infer_dtype(values: &[Value]) -> ColumnType {
    let mut seen: Option<ColumnType> = None;
    for v in values {
        let t = match v {
            Value::Null => continue,
            Value::Int(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::Bool(_) => ColumnType::Boolean,
            Value::Timestamp(_) => ColumnType::Timestamp,
            Value::Text(_) => ColumnType::Text,
        };
        seen = Some(match seen {
            None => t,
            Some(prev) if prev == t => t,
            Some(prev) if prev.is_numeric() && t.is_numeric() => ColumnType::Float,
            Some(_) => return ColumnType::Text,
        });
    }
    seen.unwrap_or(ColumnType::Text)
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A named, typed sequence of values. Nulls are permitted unless a validator
/// says otherwise.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    /// Build a column, inferring its dtype from the values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = infer_dtype(&values);
        Column {
            name: name.into(),
            dtype,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_numeric(&self) -> bool {
        self.dtype.is_numeric()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Numeric view of the column: `None` for nulls and non-numeric cells.
    pub fn as_f64(&self) -> Vec<Option<f64>> {
        self.values.iter().map(Value::as_f64).collect()
    }
}

// ---------------------------------------------------------------------------
// Dataset – ordered, named columns with uniform row count
// ---------------------------------------------------------------------------

/// An ordered collection of columns with unique names and a uniform row
/// count. Construction enforces both invariants; consumers clone before
/// mutating so a cached dataset is never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<Column>,
}

impl Dataset {
    /// Build a dataset, enforcing unique names and uniform row count.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for col in &columns {
            if !names.insert(&col.name) {
                return Err(DataError::Parse(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        if let Some(first) = columns.first() {
            let rows = first.len();
            for col in &columns[1..] {
                if col.len() != rows {
                    return Err(DataError::Parse(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.len(),
                        rows
                    )));
                }
            }
        }
        Ok(Dataset { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Names of numeric (integer or float) columns, in declaration order.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Copy of the last `n` rows, preserving column order. `n >= row_count`
    /// copies everything.
    pub fn tail(&self, n: usize) -> Dataset {
        let rows = self.row_count();
        let skip = rows.saturating_sub(n);
        Dataset {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    dtype: c.dtype,
                    values: c.values[skip..].to_vec(),
                })
                .collect(),
        }
    }

    /// Projection onto the given columns, in the given order.
    /// Fails with `UnknownColumn` when a name is absent.
    pub fn select(&self, names: &[String]) -> Result<Dataset> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name)
                    .cloned()
                    .ok_or_else(|| DataError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset { columns })
    }
}
