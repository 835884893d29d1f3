//! Registries mapping string keys to model and chart strategies. Keys are
//! the stable identifiers an embedding application stores in its own
//! configuration.

use log::warn;
use serde::Serialize;

use crate::chart::{BarChart, ChartStrategy, LineChart, PieChart, ScatterChart};
use crate::error::{DataError, Result};
use crate::models::{AnalyticalModel, GroupingModel, OutlierDetectionModel, TrendForecastModel};

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// Default forecast horizon, in rows.
const DEFAULT_FORECAST_PERIOD: usize = 10;
/// Default expected outlier fraction.
const DEFAULT_CONTAMINATION: f64 = 0.05;
/// Default group count.
const DEFAULT_CLUSTERS: usize = 3;

const MODEL_KEYS: [&str; 3] = ["linear_forecast", "anomaly_detection", "clustering"];

/// Catalog entry describing one registered model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Instantiate the model registered under `key` with its default
/// parameters. Unknown keys are an error: a misspelled model name is a
/// caller bug, not something to paper over.
pub fn create_model(key: &str) -> Result<Box<dyn AnalyticalModel>> {
    match key {
        "linear_forecast" => Ok(Box::new(TrendForecastModel::new(DEFAULT_FORECAST_PERIOD)?)),
        "anomaly_detection" => Ok(Box::new(OutlierDetectionModel::new(DEFAULT_CONTAMINATION)?)),
        "clustering" => Ok(Box::new(GroupingModel::new(DEFAULT_CLUSTERS)?)),
        other => Err(DataError::UnknownModel(other.to_string())),
    }
}

/// Registered model keys, in declaration order.
pub fn model_keys() -> Vec<&'static str> {
    MODEL_KEYS.to_vec()
}

/// Id, display name, and description for every registered model.
pub fn model_catalog() -> Vec<ModelInfo> {
    MODEL_KEYS
        .iter()
        .map(|&id| {
            let model = create_model(id).expect("registered keys always construct");
            ModelInfo {
                id,
                name: model.name(),
                description: model.description(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

const CHART_KEYS: [&str; 4] = ["bar", "line", "scatter", "pie"];

/// Instantiate the chart strategy registered under `key`. Unlike models,
/// an unknown chart key falls back to the bar chart with a warning: the
/// caller still gets something drawable.
pub fn create_chart(key: &str) -> Box<dyn ChartStrategy> {
    match key {
        "bar" => Box::new(BarChart),
        "line" => Box::new(LineChart),
        "scatter" => Box::new(ScatterChart),
        "pie" => Box::new(PieChart),
        other => {
            warn!("unknown chart type '{other}', falling back to bar");
            Box::new(BarChart)
        }
    }
}

/// Registered chart keys, in declaration order.
pub fn chart_keys() -> Vec<&'static str> {
    CHART_KEYS.to_vec()
}
