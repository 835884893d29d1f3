use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use tabviz::data::loader::TabularFileLoader;
use tabviz::data::model::{Column, Dataset, Value};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Consecutive dates starting at 2024-01-01, one per row.
fn dates(count: usize) -> Vec<Value> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid start date");
    start
        .iter_days()
        .take(count)
        .map(|d| Value::Timestamp(d.format("%Y-%m-%d").to_string()))
        .collect()
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let rows = 120;
    let regions = ["North", "South", "East", "West"];

    // Revenue: upward trend with noise and a couple of spikes.
    let revenue: Vec<Value> = (0..rows)
        .map(|i| {
            let base = 1000.0 + i as f64 * 12.5 + rng.gauss(0.0, 40.0);
            let spike = if i == 30 || i == 90 { 900.0 } else { 0.0 };
            Value::Float(base + spike)
        })
        .collect();

    // Units: correlated with revenue, 5% of cells left empty.
    let units: Vec<Value> = revenue
        .iter()
        .map(|v| {
            if rng.next_f64() < 0.05 {
                return Value::Null;
            }
            match v {
                Value::Float(r) => Value::Int((r / 25.0 + rng.gauss(0.0, 2.0)).round() as i64),
                _ => Value::Null,
            }
        })
        .collect();

    let region: Vec<Value> = (0..rows)
        .map(|_| {
            let pick = (rng.next_u64() % regions.len() as u64) as usize;
            Value::Text(regions[pick].to_string())
        })
        .collect();

    let dataset = Dataset::from_columns(vec![
        Column::new("date", dates(rows)),
        Column::new("revenue", revenue),
        Column::new("units", units),
        Column::new("region", region),
    ])?;

    let output_path = "sample_data.csv";
    TabularFileLoader::new()
        .save(&dataset, Path::new(output_path), false)
        .context("failed to write sample data")?;

    println!(
        "Wrote {} rows x {} columns to {output_path}",
        dataset.row_count(),
        dataset.column_names().len()
    );
    Ok(())
}
