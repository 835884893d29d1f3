//! End-to-end pipeline: delimited file -> repository -> validation ->
//! visualization projection -> model -> chart.

use std::collections::BTreeMap;
use std::io::Write;

use tempfile::NamedTempFile;

use tabviz::chart::ChartData;
use tabviz::data::model::{ColumnType, Value};
use tabviz::data::repository::{DataRepository, INDEX_LABEL};
use tabviz::data::store::MemoryStore;
use tabviz::error::DataError;
use tabviz::registry;

fn write_csv(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn sales_csv() -> NamedTempFile {
    let mut body = String::from("date,revenue,units,region\n");
    for i in 0..12 {
        body.push_str(&format!(
            "2024-01-{:02},{},{},North\n",
            i + 1,
            1000 + i * 10,
            40 + i
        ));
    }
    write_csv(&body)
}

fn repo() -> (DataRepository, MemoryStore) {
    let store = MemoryStore::new();
    (DataRepository::new(Box::new(store.clone())), store)
}

#[test]
fn file_to_chart_via_forecast() {
    let file = sales_csv();
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, _) = repo();

    let (dataset, meta) = repo.load(&id).unwrap();
    assert_eq!(dataset.row_count(), 12);
    assert_eq!(meta.column_names, vec!["date", "revenue", "units", "region"]);
    assert!(meta.numeric_columns.contains(&"revenue".to_string()));

    // Dates arrive as text; coerce them to timestamps.
    let result = repo
        .validate_column(&id, "date", ColumnType::Timestamp, None)
        .unwrap();
    assert!(result.passed);

    let viz = repo.prepare_for_visualization(&id, Some("date"), 100).unwrap();
    assert_eq!(viz.x_label, "date");
    assert_eq!(viz.x.len(), 12);
    assert_eq!(viz.y.column_names(), vec!["revenue", "units"]);

    let mut model = registry::create_model("linear_forecast").unwrap();
    model.fit(&viz.y).unwrap();
    let forecast = model.predict(&viz.y).unwrap();
    assert_eq!(forecast.row_count(), 10); // default horizon

    let overlay = model.render(&viz, &forecast).unwrap();
    assert_eq!(overlay.series.len(), 2);
    assert_eq!(overlay.series[0].points.len(), 10);

    match registry::create_chart("line").build(&viz).unwrap() {
        ChartData::Xy { series, .. } => assert_eq!(series.len(), 2),
        other => panic!("unexpected chart data: {other:?}"),
    }
}

#[test]
fn file_to_store_round_trip() {
    let file = sales_csv();
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, store) = repo();

    repo.connect_store("memory://localhost", "analytics").unwrap();
    repo.load(&id).unwrap();
    let inserted = repo.save_to_store(&id, "sales", false).unwrap();
    assert_eq!(inserted, 12);
    assert_eq!(store.document_count("sales"), 12);

    let (from_store, meta) = repo.load("store://analytics/sales").unwrap();
    assert_eq!(from_store.row_count(), 12);
    // The store identity field never leaks into the dataset.
    assert_eq!(meta.column_names, vec!["date", "revenue", "units", "region"]);
}

#[test]
fn store_loads_are_served_from_cache() {
    let file = sales_csv();
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, store) = repo();

    repo.connect_store("memory://localhost", "analytics").unwrap();
    repo.load(&id).unwrap();
    repo.save_to_store(&id, "sales", false).unwrap();

    repo.load("store://analytics/sales").unwrap();
    let after_first = store.find_calls();
    repo.load("store://analytics/sales").unwrap();
    repo.prepare_for_visualization("store://analytics/sales", None, 5)
        .unwrap();
    assert_eq!(store.find_calls(), after_first);
}

#[test]
fn window_and_index_synthesis() {
    let file = sales_csv();
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, _) = repo();
    repo.load(&id).unwrap();

    let viz = repo.prepare_for_visualization(&id, None, 5).unwrap();
    assert_eq!(viz.x_label, INDEX_LABEL);
    assert_eq!(viz.x, vec![
        Value::Int(0),
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
        Value::Int(4),
    ]);
    // Last 5 of 12 rows.
    assert_eq!(
        viz.y.column("revenue").unwrap().values[0],
        Value::Int(1070)
    );
}

#[test]
fn validation_failure_is_reported_not_raised() {
    let file = write_csv("name,v\nalpha,1\nbeta,2\n");
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, _) = repo();
    repo.load(&id).unwrap();

    let result = repo
        .validate_column(&id, "name", ColumnType::Integer, None)
        .unwrap();
    assert!(!result.passed);
    let remediation = result.remediation.unwrap();
    assert!(remediation.contains("alpha"), "got: {remediation}");
}

#[test]
fn unknown_model_fails_but_unknown_chart_degrades() {
    assert!(matches!(
        registry::create_model("does_not_exist"),
        Err(DataError::UnknownModel(_))
    ));

    let file = sales_csv();
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, _) = repo();
    repo.load(&id).unwrap();
    let viz = repo.prepare_for_visualization(&id, None, 100).unwrap();

    // The fallback still produces a drawable chart.
    match registry::create_chart("does_not_exist").build(&viz).unwrap() {
        ChartData::Xy { series, .. } => assert!(!series.is_empty()),
        other => panic!("unexpected chart data: {other:?}"),
    }
}

#[test]
fn clustering_over_the_pipeline() {
    let mut body = String::from("v\n");
    for i in 0..6 {
        body.push_str(&format!("{}\n", 1.0 + i as f64 / 10.0));
    }
    for i in 0..6 {
        body.push_str(&format!("{}\n", 100.0 + i as f64 / 10.0));
    }
    let file = write_csv(&body);
    let id = file.path().to_str().unwrap().to_string();
    let (mut repo, _) = repo();

    let (dataset, _) = repo.load(&id).unwrap();
    let mut model = registry::create_model("clustering").unwrap();
    model
        .set_parameters(&BTreeMap::from([("clusters".to_string(), 2.0)]))
        .unwrap();
    model.fit(&dataset).unwrap();
    let output = model.predict(&dataset).unwrap();

    let labels = &output.column("cluster").unwrap().values;
    assert_eq!(labels[0], labels[5]);
    assert_eq!(labels[6], labels[11]);
    assert_ne!(labels[0], labels[6]);
}
