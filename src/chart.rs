//! Chart strategies: turn a visualization projection into serializable,
//! render-ready data. The external renderer owns every pixel and axis
//! decision; this module only shapes series and slices.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::data::model::Value;
use crate::data::repository::VisualizationData;
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// Render-ready shapes
// ---------------------------------------------------------------------------

/// How the renderer should draw a series. A hint, not an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Line,
    Points,
    Bars,
}

/// One labelled series of `[x, y]` points.
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub label: String,
    pub kind: SeriesKind,
    pub points: Vec<[f64; 2]>,
}

/// Model output shaped for drawing on top of a chart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChartOverlay {
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
}

/// The complete render-ready payload for one chart.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChartData {
    Xy {
        title: String,
        x_label: String,
        series: Vec<Series>,
    },
    Pie {
        title: String,
        slices: Vec<PieSlice>,
    },
}

/// The chart variants this crate can shape data for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
}

// ---------------------------------------------------------------------------
// X positions
// ---------------------------------------------------------------------------

/// Map the X series onto numeric positions: numeric values as-is,
/// timestamps as days since the Unix epoch, anything else (including any
/// null) as the 0-based row position.
pub fn x_positions(x: &[Value]) -> Vec<f64> {
    if let Some(nums) = x.iter().map(Value::as_f64).collect::<Option<Vec<_>>>() {
        return nums;
    }
    let stamps: Option<Vec<f64>> = x
        .iter()
        .map(|v| match v {
            Value::Timestamp(s) => timestamp_to_days(s),
            _ => None,
        })
        .collect();
    if let Some(days) = stamps {
        return days;
    }
    (0..x.len()).map(|i| i as f64).collect()
}

/// Days since 1970-01-01 for an ISO-8601 date/datetime (date part only).
/// `chrono`'s `NaiveDate` default is the Unix epoch.
fn timestamp_to_days(s: &str) -> Option<f64> {
    let date = NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()?;
    Some(date.signed_duration_since(NaiveDate::default()).num_days() as f64)
}

// ---------------------------------------------------------------------------
// ChartStrategy – one variant per chart type
// ---------------------------------------------------------------------------

/// Strategy contract: shape a projection into render-ready chart data.
pub trait ChartStrategy {
    fn kind(&self) -> ChartKind;

    fn build(&self, viz: &VisualizationData) -> Result<ChartData>;
}

/// Series for every Y column, skipping rows where the value is null.
fn xy_series(viz: &VisualizationData, kind: SeriesKind) -> Vec<Series> {
    let xs = x_positions(&viz.x);
    viz.y
        .columns()
        .iter()
        .map(|col| Series {
            label: col.name.clone(),
            kind,
            points: xs
                .iter()
                .zip(col.as_f64())
                .filter_map(|(&x, y)| y.map(|y| [x, y]))
                .collect(),
        })
        .collect()
}

pub struct BarChart;

impl ChartStrategy for BarChart {
    fn kind(&self) -> ChartKind {
        ChartKind::Bar
    }

    fn build(&self, viz: &VisualizationData) -> Result<ChartData> {
        Ok(ChartData::Xy {
            title: format!("Bar chart - {}", viz.x_label),
            x_label: viz.x_label.clone(),
            series: xy_series(viz, SeriesKind::Bars),
        })
    }
}

pub struct LineChart;

impl ChartStrategy for LineChart {
    fn kind(&self) -> ChartKind {
        ChartKind::Line
    }

    fn build(&self, viz: &VisualizationData) -> Result<ChartData> {
        Ok(ChartData::Xy {
            title: format!("Line chart - {}", viz.x_label),
            x_label: viz.x_label.clone(),
            series: xy_series(viz, SeriesKind::Line),
        })
    }
}

pub struct ScatterChart;

impl ChartStrategy for ScatterChart {
    fn kind(&self) -> ChartKind {
        ChartKind::Scatter
    }

    fn build(&self, viz: &VisualizationData) -> Result<ChartData> {
        Ok(ChartData::Xy {
            title: format!("Scatter chart - {}", viz.x_label),
            x_label: viz.x_label.clone(),
            series: xy_series(viz, SeriesKind::Points),
        })
    }
}

/// Pie charts use only the first numeric column; slices under 5% of the
/// total are grouped into an `other` bucket for legibility.
pub struct PieChart;

const PIE_GROUP_THRESHOLD: f64 = 0.05;

impl ChartStrategy for PieChart {
    fn kind(&self) -> ChartKind {
        ChartKind::Pie
    }

    fn build(&self, viz: &VisualizationData) -> Result<ChartData> {
        let col = viz.y.columns().first().ok_or(DataError::NoNumericData)?;
        // Absolute values: negative magnitudes still occupy a slice.
        let labelled: Vec<(String, f64)> = viz
            .x
            .iter()
            .zip(col.as_f64())
            .filter_map(|(label, v)| v.map(|v| (label.to_string(), v.abs())))
            .collect();
        let total: f64 = labelled.iter().map(|(_, v)| v).sum();
        if total == 0.0 {
            return Err(DataError::validation(
                col.name.clone(),
                "no non-zero values for a pie chart",
                vec![],
            ));
        }

        // Merge duplicate labels, then bucket the small ones.
        let mut merged: BTreeMap<String, f64> = BTreeMap::new();
        let mut order: Vec<String> = Vec::new();
        for (label, v) in labelled {
            if !merged.contains_key(&label) {
                order.push(label.clone());
            }
            *merged.entry(label).or_default() += v;
        }

        let mut slices: Vec<PieSlice> = Vec::new();
        let mut other = 0.0;
        for label in order {
            let value = merged[&label];
            if value / total < PIE_GROUP_THRESHOLD {
                other += value;
            } else {
                slices.push(PieSlice { label, value });
            }
        }
        if other > 0.0 {
            slices.push(PieSlice {
                label: "other".to_string(),
                value: other,
            });
        }

        Ok(ChartData::Pie {
            title: format!("Distribution of {}", col.name),
            slices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Column, Dataset};

    fn viz(x: Vec<Value>, y_cols: Vec<Column>) -> VisualizationData {
        VisualizationData {
            x_label: "x".to_string(),
            x,
            y: Dataset::from_columns(y_cols).unwrap(),
        }
    }

    #[test]
    fn x_positions_prefer_numeric_then_timestamp_then_index() {
        assert_eq!(x_positions(&[Value::Int(5), Value::Float(6.5)]), vec![5.0, 6.5]);
        let days = x_positions(&[
            Value::Timestamp("1970-01-01".into()),
            Value::Timestamp("1970-01-03".into()),
        ]);
        assert_eq!(days, vec![0.0, 2.0]);
        assert_eq!(
            x_positions(&[Value::Text("a".into()), Value::Text("b".into())]),
            vec![0.0, 1.0]
        );
    }

    #[test]
    fn epoch_day_conversion_handles_leap_years() {
        assert_eq!(timestamp_to_days("1970-01-01"), Some(0.0));
        assert_eq!(timestamp_to_days("1972-03-01"), Some(790.0)); // 1972 is a leap year
        assert_eq!(timestamp_to_days("1969-12-31"), Some(-1.0));
        assert_eq!(timestamp_to_days("2024-02-31"), None);
    }

    #[test]
    fn impossible_dates_fall_back_to_positional_x() {
        let xs = x_positions(&[
            Value::Timestamp("2024-02-30".into()),
            Value::Timestamp("2024-03-01".into()),
        ]);
        assert_eq!(xs, vec![0.0, 1.0]);
    }

    #[test]
    fn line_chart_emits_one_series_per_column_skipping_nulls() {
        let v = viz(
            vec![Value::Int(0), Value::Int(1), Value::Int(2)],
            vec![
                Column::new("a", vec![Value::Int(1), Value::Null, Value::Int(3)]),
                Column::new("b", vec![Value::Int(4), Value::Int(5), Value::Int(6)]),
            ],
        );
        match LineChart.build(&v).unwrap() {
            ChartData::Xy { series, .. } => {
                assert_eq!(series.len(), 2);
                assert_eq!(series[0].points, vec![[0.0, 1.0], [2.0, 3.0]]);
                assert_eq!(series[1].points.len(), 3);
            }
            other => panic!("unexpected chart data: {other:?}"),
        }
    }

    #[test]
    fn pie_chart_groups_small_slices() {
        let v = viz(
            vec![
                Value::Text("big".into()),
                Value::Text("mid".into()),
                Value::Text("tiny".into()),
            ],
            vec![Column::new(
                "v",
                vec![Value::Float(80.0), Value::Float(19.0), Value::Float(1.0)],
            )],
        );
        match PieChart.build(&v).unwrap() {
            ChartData::Pie { slices, .. } => {
                let labels: Vec<&str> = slices.iter().map(|s| s.label.as_str()).collect();
                assert_eq!(labels, vec!["big", "mid", "other"]);
                assert_eq!(slices[2].value, 1.0);
            }
            other => panic!("unexpected chart data: {other:?}"),
        }
    }

    #[test]
    fn pie_chart_rejects_all_zero_data() {
        let v = viz(
            vec![Value::Text("a".into())],
            vec![Column::new("v", vec![Value::Float(0.0)])],
        );
        assert!(matches!(
            PieChart.build(&v),
            Err(DataError::Validation { .. })
        ));
    }
}
