use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::chart::{ChartOverlay, Series, SeriesKind};
use crate::data::model::{Column, Dataset, Value};
use crate::data::repository::VisualizationData;
use crate::error::{DataError, Result};
use crate::models::{
    matrix_for_columns, numeric_matrix, require_fitted, AnalyticalModel, ModelState, Scaler,
};

// ---------------------------------------------------------------------------
// OutlierDetectionModel
// ---------------------------------------------------------------------------

/// Flags anomalous rows by their normalized distance from the bulk of the
/// data. The score is the root-mean-square of per-column z-values; the
/// decision threshold is placed so roughly `contamination` of the training
/// rows fall above it.
#[derive(Debug, Clone)]
pub struct OutlierDetectionModel {
    contamination: f64,
    targets: Vec<String>,
    scaler: Option<Scaler>,
    threshold: f64,
    state: ModelState,
}

impl OutlierDetectionModel {
    /// `contamination` is the expected fraction of anomalous rows, in
    /// `(0, 0.5]`.
    pub fn new(contamination: f64) -> Result<Self> {
        check_contamination(contamination)?;
        Ok(OutlierDetectionModel {
            contamination,
            targets: Vec::new(),
            scaler: None,
            threshold: 0.0,
            state: ModelState::default(),
        })
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    /// The decision threshold learned by the last fit.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn scores(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        let scaler = self.scaler.as_ref().expect("scores called before fit");
        scaler
            .transform(rows)
            .iter()
            .map(|z| {
                let dims = z.len().max(1) as f64;
                (z.iter().map(|v| v * v).sum::<f64>() / dims).sqrt()
            })
            .collect()
    }
}

fn check_contamination(value: f64) -> Result<()> {
    if value > 0.0 && value <= 0.5 {
        Ok(())
    } else {
        Err(DataError::InvalidArgument(format!(
            "contamination must be in (0, 0.5], got {value}"
        )))
    }
}

impl AnalyticalModel for OutlierDetectionModel {
    fn name(&self) -> &'static str {
        "Anomaly detection"
    }

    fn description(&self) -> &'static str {
        "Flags rows far from the normalized center of the data"
    }

    fn is_fitted(&self) -> bool {
        self.state.is_fitted()
    }

    fn fit(&mut self, data: &Dataset) -> Result<()> {
        let started = Instant::now();
        let matrix = numeric_matrix(data)?;
        let n = matrix.rows.len();
        if n < 2 {
            return Err(DataError::InsufficientData { needed: 2, got: n });
        }

        self.scaler = Some(Scaler::fit(&matrix.rows));
        self.targets = matrix.names;

        // Place the threshold at the (1 - contamination) quantile of the
        // training scores.
        let mut sorted = self.scores(&matrix.rows);
        sorted.sort_by(f64::total_cmp);
        let idx = ((n - 1) as f64 * (1.0 - self.contamination)).round() as usize;
        self.threshold = sorted[idx.min(n - 1)];

        self.state.record_fit(started);
        Ok(())
    }

    fn predict(&mut self, data: &Dataset) -> Result<Dataset> {
        require_fitted(self.state.is_fitted())?;
        let started = Instant::now();

        let matrix = matrix_for_columns(data, &self.targets)?;
        let scores = self.scores(&matrix.rows);
        let flags: Vec<Value> = scores
            .iter()
            .map(|&s| Value::Bool(s > self.threshold))
            .collect();
        let scores: Vec<Value> = scores.into_iter().map(Value::Float).collect();

        let output = Dataset::from_columns(vec![
            Column::new("is_outlier", flags),
            Column::new("score", scores),
        ])?;
        self.state.record_predict(started);
        Ok(output)
    }

    fn render(&self, viz: &VisualizationData, output: &Dataset) -> Result<ChartOverlay> {
        let flags = output
            .column("is_outlier")
            .ok_or_else(|| DataError::MissingColumns(vec!["is_outlier".to_string()]))?;
        let xs = crate::chart::x_positions(&viz.x);

        // Mark flagged rows on every Y series.
        let series = viz
            .y
            .columns()
            .iter()
            .map(|col| Series {
                label: format!("{} (outliers)", col.name),
                kind: SeriesKind::Points,
                points: xs
                    .iter()
                    .zip(col.as_f64())
                    .zip(&flags.values)
                    .filter_map(|((&x, y), flag)| match (y, flag) {
                        (Some(y), Value::Bool(true)) => Some([x, y]),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();
        Ok(ChartOverlay { series })
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("contamination".to_string(), self.contamination)])
    }

    fn set_parameters(&mut self, params: &BTreeMap<String, f64>) -> Result<()> {
        for (key, &value) in params {
            match key.as_str() {
                "contamination" => {
                    check_contamination(value)?;
                    self.contamination = value;
                    self.state.reset();
                }
                other => {
                    return Err(DataError::InvalidArgument(format!(
                        "unknown parameter '{other}'"
                    )))
                }
            }
        }
        Ok(())
    }

    fn fit_duration(&self) -> Option<Duration> {
        self.state.fit_duration()
    }

    fn predict_duration(&self) -> Option<Duration> {
        self.state.predict_duration()
    }
}
