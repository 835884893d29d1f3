//! Analytical models: stateful fit/predict transforms over the numeric
//! columns of a dataset.
//!
//! Lifecycle shared by every variant:
//! ```text
//!   unfitted ──fit──▶ fitted ──predict──▶ fitted (repeatable)
//!      ▲                                     │
//!      └──────── set_parameters ◀────────────┘
//! ```
//! Changing any parameter drops back to unfitted, forcing a re-fit before
//! the next predict.

pub mod forecast;
pub mod grouping;
pub mod outlier;

pub use forecast::TrendForecastModel;
pub use grouping::GroupingModel;
pub use outlier::OutlierDetectionModel;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::chart::ChartOverlay;
use crate::data::model::Dataset;
use crate::data::repository::VisualizationData;
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// AnalyticalModel – the strategy contract
// ---------------------------------------------------------------------------

/// A stateful analytical transform with a uniform lifecycle.
///
/// `predict` output is a row-aligned [`Dataset`] so every variant hands the
/// renderer the same shape. `render` turns input plus output into an
/// external-renderer-ready overlay.
pub trait AnalyticalModel {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn is_fitted(&self) -> bool;

    fn fit(&mut self, data: &Dataset) -> Result<()>;

    fn predict(&mut self, data: &Dataset) -> Result<Dataset>;

    /// Build a renderer-ready overlay from the model's prediction.
    fn render(&self, viz: &VisualizationData, output: &Dataset) -> Result<ChartOverlay>;

    /// Current parameter values, keyed by parameter name.
    fn parameters(&self) -> BTreeMap<String, f64>;

    /// Reconfigure the model. Unknown keys and out-of-domain values are
    /// rejected with `InvalidArgument`; any accepted change resets the
    /// fitted state.
    fn set_parameters(&mut self, params: &BTreeMap<String, f64>) -> Result<()>;

    /// Wall-clock duration of the last fit, if any.
    fn fit_duration(&self) -> Option<Duration>;

    /// Wall-clock duration of the last predict, if any.
    fn predict_duration(&self) -> Option<Duration>;
}

/// Guard shared by every variant's `predict`.
pub(crate) fn require_fitted(fitted: bool) -> Result<()> {
    if fitted {
        Ok(())
    } else {
        Err(DataError::InvalidArgument(
            "model must be fitted before predict".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// ModelState – fitted flag plus timing, shared by all variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub(crate) struct ModelState {
    fitted: bool,
    fit_duration: Option<Duration>,
    predict_duration: Option<Duration>,
}

impl ModelState {
    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn record_fit(&mut self, started: Instant) {
        self.fitted = true;
        self.fit_duration = Some(started.elapsed());
    }

    pub fn record_predict(&mut self, started: Instant) {
        self.predict_duration = Some(started.elapsed());
    }

    /// Back to unfitted; durations are kept for inspection.
    pub fn reset(&mut self) {
        self.fitted = false;
    }

    pub fn fit_duration(&self) -> Option<Duration> {
        self.fit_duration
    }

    pub fn predict_duration(&self) -> Option<Duration> {
        self.predict_duration
    }
}

// ---------------------------------------------------------------------------
// Numeric matrix extraction (mean imputation) and normalization
// ---------------------------------------------------------------------------

/// Row-major numeric view of a dataset. Nulls are imputed with the mean of
/// the extracted column, never dropped.
#[derive(Debug, Clone)]
pub(crate) struct NumericMatrix {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Extract every numeric column. Fails with `NoNumericData` when there is
/// none.
pub(crate) fn numeric_matrix(data: &Dataset) -> Result<NumericMatrix> {
    let names = data.numeric_column_names();
    if names.is_empty() {
        return Err(DataError::NoNumericData);
    }
    matrix_for_columns(data, &names)
}

/// Extract the named columns in order. Fails with `MissingColumns` listing
/// every absent name.
pub(crate) fn matrix_for_columns(data: &Dataset, names: &[String]) -> Result<NumericMatrix> {
    let missing: Vec<String> = names
        .iter()
        .filter(|n| data.column(n).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(DataError::MissingColumns(missing));
    }

    let rows = data.row_count();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(names.len());
    for name in names {
        let raw = data.column(name).map(|c| c.as_f64()).unwrap_or_default();
        let present: Vec<f64> = raw.iter().flatten().copied().collect();
        let mean = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        };
        columns.push(raw.into_iter().map(|v| v.unwrap_or(mean)).collect());
    }

    let rows: Vec<Vec<f64>> = (0..rows)
        .map(|r| columns.iter().map(|c| c[r]).collect())
        .collect();
    Ok(NumericMatrix {
        names: names.to_vec(),
        rows,
    })
}

/// Zero-mean/unit-variance normalizer shared by the outlier and grouping
/// variants. Zero-variance columns pass through unscaled.
#[derive(Debug, Clone)]
pub(crate) struct Scaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl Scaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let means: Vec<f64> = (0..dims)
            .map(|d| rows.iter().map(|r| r[d]).sum::<f64>() / n)
            .collect();
        let stds: Vec<f64> = (0..dims)
            .map(|d| {
                let var = rows.iter().map(|r| (r[d] - means[d]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > 0.0 {
                    std
                } else {
                    1.0
                }
            })
            .collect();
        Scaler { means, stds }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|r| {
                r.iter()
                    .zip(self.means.iter().zip(&self.stds))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }
}

pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, Value};

    fn mixed_dataset() -> Dataset {
        Dataset::from_columns(vec![
            Column::new("name", vec![Value::Text("a".into()), Value::Text("b".into())]),
            Column::new("v", vec![Value::Float(1.0), Value::Null]),
        ])
        .unwrap()
    }

    #[test]
    fn matrix_imputes_nulls_with_the_column_mean() {
        let m = numeric_matrix(&mixed_dataset()).unwrap();
        assert_eq!(m.names, vec!["v"]);
        assert_eq!(m.rows, vec![vec![1.0], vec![1.0]]);
    }

    #[test]
    fn matrix_reports_missing_columns() {
        let err = matrix_for_columns(&mixed_dataset(), &["v".to_string(), "w".to_string()])
            .unwrap_err();
        match err {
            DataError::MissingColumns(cols) => assert_eq!(cols, vec!["w"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_only_dataset_has_no_numeric_data() {
        let ds = Dataset::from_columns(vec![Column::new(
            "name",
            vec![Value::Text("a".into())],
        )])
        .unwrap();
        assert!(matches!(numeric_matrix(&ds), Err(DataError::NoNumericData)));
    }

    #[test]
    fn scaler_centers_and_scales() {
        let rows = vec![vec![1.0], vec![3.0]];
        let scaler = Scaler::fit(&rows);
        let scaled = scaler.transform(&rows);
        assert!((scaled[0][0] + 1.0).abs() < 1e-12);
        assert!((scaled[1][0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn scaler_leaves_constant_columns_alone() {
        let rows = vec![vec![5.0], vec![5.0]];
        let scaler = Scaler::fit(&rows);
        let scaled = scaler.transform(&rows);
        assert_eq!(scaled[0][0], 0.0);
        assert_eq!(scaled[1][0], 0.0);
    }
}
