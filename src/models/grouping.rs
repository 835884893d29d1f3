use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::chart::{ChartOverlay, Series, SeriesKind};
use crate::data::model::{Column, Dataset, Value};
use crate::data::repository::VisualizationData;
use crate::error::{DataError, Result};
use crate::models::{
    euclidean, matrix_for_columns, numeric_matrix, require_fitted, AnalyticalModel, ModelState,
    Scaler,
};

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// GroupingModel
// ---------------------------------------------------------------------------

/// Partitions rows into k groups by Lloyd iteration over the normalized
/// numeric columns. The requested group count shrinks automatically when
/// the dataset is too small to support it.
#[derive(Debug, Clone)]
pub struct GroupingModel {
    requested: usize,
    targets: Vec<String>,
    scaler: Option<Scaler>,
    centroids: Vec<Vec<f64>>,
    state: ModelState,
}

impl GroupingModel {
    /// `clusters` is the requested group count, at least 2.
    pub fn new(clusters: usize) -> Result<Self> {
        check_cluster_count(clusters)?;
        Ok(GroupingModel {
            requested: clusters,
            targets: Vec::new(),
            scaler: None,
            centroids: Vec::new(),
            state: ModelState::default(),
        })
    }

    pub fn requested_clusters(&self) -> usize {
        self.requested
    }

    /// The group count actually used by the last fit.
    pub fn effective_clusters(&self) -> usize {
        self.centroids.len()
    }
}

fn check_cluster_count(clusters: usize) -> Result<()> {
    if clusters >= 2 {
        Ok(())
    } else {
        Err(DataError::InvalidArgument(format!(
            "cluster count must be at least 2, got {clusters}"
        )))
    }
}

/// Deterministic seeding: order rows by their distance from the origin and
/// pick k evenly spaced ones.
fn seed_centroids(rows: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| {
        let na: f64 = rows[a].iter().map(|v| v * v).sum();
        let nb: f64 = rows[b].iter().map(|v| v * v).sum();
        na.total_cmp(&nb)
    });
    (0..k)
        .map(|i| {
            let pos = (i as f64 * (rows.len() - 1) as f64 / (k - 1) as f64).round() as usize;
            rows[order[pos]].clone()
        })
        .collect()
}

fn nearest(centroids: &[Vec<f64>], row: &[f64]) -> usize {
    centroids
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| euclidean(a, row).total_cmp(&euclidean(b, row)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

impl AnalyticalModel for GroupingModel {
    fn name(&self) -> &'static str {
        "Clustering"
    }

    fn description(&self) -> &'static str {
        "Groups similar rows by iterative centroid refinement"
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

        // Shrink when there are fewer than two rows per requested group.
        let k = if n < 2 * self.requested {
            let shrunk = (n / 2).max(2).min(self.requested);
            debug!(
                "shrinking cluster count from {} to {shrunk} for {n} rows",
                self.requested
            );
            shrunk
        } else {
            self.requested
        };

        let scaler = Scaler::fit(&matrix.rows);
        let scaled = scaler.transform(&matrix.rows);
        let mut centroids = seed_centroids(&scaled, k);

        for _ in 0..MAX_ITERATIONS {
            let assignments: Vec<usize> = scaled.iter().map(|r| nearest(&centroids, r)).collect();

            let dims = centroids[0].len();
            let mut sums = vec![vec![0.0; dims]; k];
            let mut counts = vec![0usize; k];
            for (row, &c) in scaled.iter().zip(&assignments) {
                counts[c] += 1;
                for (s, v) in sums[c].iter_mut().zip(row) {
                    *s += v;
                }
            }

            let mut shift: f64 = 0.0;
            for c in 0..k {
                // An empty group keeps its previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                let next: Vec<f64> =
                    sums[c].iter().map(|s| s / counts[c] as f64).collect();
                shift += euclidean(&centroids[c], &next);
                centroids[c] = next;
            }
            if shift < CONVERGENCE_EPSILON {
                break;
            }
        }

        self.scaler = Some(scaler);
        self.targets = matrix.names;
        self.centroids = centroids;
        self.state.record_fit(started);
        Ok(())
    }

    fn predict(&mut self, data: &Dataset) -> Result<Dataset> {
        require_fitted(self.state.is_fitted())?;
        let started = Instant::now();

        let matrix = matrix_for_columns(data, &self.targets)?;
        let scaler = self.scaler.as_ref().expect("checked by require_fitted");
        let scaled = scaler.transform(&matrix.rows);

        let labels: Vec<Value> = scaled
            .iter()
            .map(|r| Value::Int(nearest(&self.centroids, r) as i64))
            .collect();

        let mut columns = vec![Column::new("cluster", labels)];
        for (i, centroid) in self.centroids.iter().enumerate() {
            let distances: Vec<Value> = scaled
                .iter()
                .map(|r| Value::Float(euclidean(centroid, r)))
                .collect();
            columns.push(Column::new(format!("dist_cluster_{i}"), distances));
        }

        let output = Dataset::from_columns(columns)?;
        self.state.record_predict(started);
        Ok(output)
    }

    fn render(&self, viz: &VisualizationData, output: &Dataset) -> Result<ChartOverlay> {
        let labels = output
            .column("cluster")
            .ok_or_else(|| DataError::MissingColumns(vec!["cluster".to_string()]))?;
        let col = viz.y.columns().first().ok_or(DataError::NoNumericData)?;
        let xs = crate::chart::x_positions(&viz.x);

        // One point series per group so the renderer can color them apart.
        let series = (0..self.centroids.len())
            .map(|c| Series {
                label: format!("cluster {c}"),
                kind: SeriesKind::Points,
                points: xs
                    .iter()
                    .zip(col.as_f64())
                    .zip(&labels.values)
                    .filter_map(|((&x, y), label)| match (y, label) {
                        (Some(y), Value::Int(l)) if *l == c as i64 => Some([x, y]),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();
        Ok(ChartOverlay { series })
    }

    fn parameters(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("clusters".to_string(), self.requested as f64)])
    }

    fn set_parameters(&mut self, params: &BTreeMap<String, f64>) -> Result<()> {
        for (key, &value) in params {
            match key.as_str() {
                "clusters" => {
                    if value.fract() != 0.0 || value < 2.0 {
                        return Err(DataError::InvalidArgument(format!(
                            "cluster count must be an integer of at least 2, got {value}"
                        )));
                    }
                    self.requested = value as usize;
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

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated blobs of three rows each.
    fn two_blobs() -> Dataset {
        let values = vec![
            Value::Float(1.0),
            Value::Float(1.1),
            Value::Float(0.9),
            Value::Float(100.0),
            Value::Float(100.1),
            Value::Float(99.9),
        ];
        Dataset::from_columns(vec![Column::new("v", values)]).unwrap()
    }

    #[test]
    fn separated_blobs_land_in_different_groups() {
        let data = two_blobs();
        let mut model = GroupingModel::new(2).unwrap();
        model.fit(&data).unwrap();
        let output = model.predict(&data).unwrap();

        let labels = &output.column("cluster").unwrap().values;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn distance_columns_cover_every_group() {
        let data = two_blobs();
        let mut model = GroupingModel::new(2).unwrap();
        model.fit(&data).unwrap();
        let output = model.predict(&data).unwrap();

        assert_eq!(
            output.column_names(),
            vec!["cluster", "dist_cluster_0", "dist_cluster_1"]
        );
    }

    #[test]
    fn group_count_shrinks_on_small_data() {
        let data = two_blobs(); // 6 rows
        let mut model = GroupingModel::new(5).unwrap();
        model.fit(&data).unwrap();
        assert_eq!(model.effective_clusters(), 3);
        assert_eq!(model.requested_clusters(), 5);
    }

    #[test]
    fn fit_is_deterministic() {
        let data = two_blobs();
        let mut a = GroupingModel::new(2).unwrap();
        let mut b = GroupingModel::new(2).unwrap();
        a.fit(&data).unwrap();
        b.fit(&data).unwrap();
        assert_eq!(
            a.predict(&data).unwrap().column("cluster").unwrap().values,
            b.predict(&data).unwrap().column("cluster").unwrap().values
        );
    }

    #[test]
    fn fewer_than_two_groups_is_rejected() {
        assert!(matches!(
            GroupingModel::new(1),
            Err(DataError::InvalidArgument(_))
        ));
        let mut model = GroupingModel::new(3).unwrap();
        let params = BTreeMap::from([("clusters".to_string(), 1.0)]);
        assert!(model.set_parameters(&params).is_err());
    }

    #[test]
    fn parameter_change_resets_the_fit() {
        let data = two_blobs();
        let mut model = GroupingModel::new(2).unwrap();
        model.fit(&data).unwrap();

        let params = BTreeMap::from([("clusters".to_string(), 3.0)]);
        model.set_parameters(&params).unwrap();
        assert!(!model.is_fitted());
    }
}
