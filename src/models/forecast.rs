use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::chart::{ChartOverlay, Series, SeriesKind};
use crate::data::model::{Column, Dataset, Value};
use crate::data::repository::VisualizationData;
use crate::error::{DataError, Result};
use crate::models::{numeric_matrix, require_fitted, AnalyticalModel, ModelState};

/// Per-column least-squares line against the synthetic time index.
#[derive(Debug, Clone, Copy)]
struct LineFit {
    slope: f64,
    intercept: f64,
}

// ---------------------------------------------------------------------------
// TrendForecastModel
// ---------------------------------------------------------------------------

/// Forecasts future values by regressing each numeric column against a
/// 0-based time index and extrapolating `period` steps past the input.
#[derive(Debug, Clone)]
pub struct TrendForecastModel {
    period: usize,
    targets: Vec<String>,
    fits: Vec<LineFit>,
    state: ModelState,
}

impl TrendForecastModel {
    /// `period` is how many future index values `predict` produces.
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(DataError::InvalidArgument(
                "forecast period must be at least 1".to_string(),
            ));
        }
        Ok(TrendForecastModel {
            period,
            targets: Vec::new(),
            fits: Vec::new(),
            state: ModelState::default(),
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl AnalyticalModel for TrendForecastModel {
    fn name(&self) -> &'static str {
        "Trend forecast"
    }

    fn description(&self) -> &'static str {
        "Predicts future values by linear trend extrapolation"
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

        // Closed-form simple regression against t = 0..n-1.
        let t_mean = (n as f64 - 1.0) / 2.0;
        let t_var: f64 = (0..n).map(|t| (t as f64 - t_mean).powi(2)).sum();

        self.fits = (0..matrix.names.len())
            .map(|c| {
                let y_mean = matrix.rows.iter().map(|r| r[c]).sum::<f64>() / n as f64;
                let covar: f64 = matrix
                    .rows
                    .iter()
                    .enumerate()
                    .map(|(t, r)| (t as f64 - t_mean) * (r[c] - y_mean))
                    .sum();
                let slope = covar / t_var;
                LineFit {
                    slope,
                    intercept: y_mean - slope * t_mean,
                }
            })
            .collect();
        self.targets = matrix.names;
        self.state.record_fit(started);
        Ok(())
    }

    fn predict(&mut self, data: &Dataset) -> Result<Dataset> {
        require_fitted(self.state.is_fitted())?;
        let started = Instant::now();

        // Extrapolation starts right after the input's last index.
        let start = data.row_count();
        let columns: Vec<Column> = self
            .targets
            .iter()
            .zip(&self.fits)
            .map(|(name, fit)| {
                let values: Vec<Value> = (0..self.period)
                    .map(|i| {
                        let t = (start + i) as f64;
                        Value::Float(fit.intercept + fit.slope * t)
                    })
                    .collect();
                Column::new(name.clone(), values)
            })
            .collect();
        let forecast = Dataset::from_columns(columns)?;
        self.state.record_predict(started);
        Ok(forecast)
    }

    fn render(&self, viz: &VisualizationData, output: &Dataset) -> Result<ChartOverlay> {
        let xs = crate::chart::x_positions(&viz.x);
        // Extend X past the observed range with the average step.
        let step = match xs.len() {
            0 | 1 => 1.0,
            n => (xs[n - 1] - xs[0]) / (n - 1) as f64,
        };
        let last = xs.last().copied().unwrap_or(-1.0);

        let series = output
            .columns()
            .iter()
            .map(|col| Series {
                label: format!("{} (forecast)", col.name),
                kind: SeriesKind::Line,
                points: col
                    .as_f64()
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.map(|v| [last + (i + 1) as f64 * step, v]))
                    .collect(),
            })
            .collect();
        Ok(ChartOverlay { series })
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("period".to_string(), self.period as f64)])
    }

    fn set_parameters(&mut self, params: &BTreeMap<String, f64>) -> Result<()> {
        for (key, &value) in params {
            match key.as_str() {
                "period" => {
                    if value < 1.0 || value.fract() != 0.0 {
                        return Err(DataError::InvalidArgument(format!(
                            "period must be a positive integer, got {value}"
                        )));
                    }
                    self.period = value as usize;
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
