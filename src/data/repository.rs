use std::collections::BTreeMap;
use std::path::PathBuf;

use log::{debug, info, warn};
use serde::Serialize;

use crate::data::loader::TabularFileLoader;
use crate::data::model::{parse_timestamp, ColumnType, Dataset, Value};
use crate::data::store::{DocumentStore, DocumentStoreLoader};
use crate::data::validator::{SchemaValidator, ValidationResult};
use crate::error::{DataError, Result};

/// Reserved label for the synthesized 0-based X axis. Real columns never get
/// this name from the loaders.
pub const INDEX_LABEL: &str = "__index__";

/// Scheme prefix distinguishing store identifiers from file paths.
pub const STORE_SCHEME: &str = "store://";

// ---------------------------------------------------------------------------
// SourceId – identifier grammar
// ---------------------------------------------------------------------------

/// A parsed source identifier. File identifiers are plain paths; store
/// identifiers use `store://<database>/<collection>`, where the collection
/// segment is optional grammar (interactive selection lives outside the
/// core, so repository loads require one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    File(PathBuf),
    Store {
        database: String,
        collection: Option<String>,
    },
}

impl SourceId {
    pub fn parse(identifier: &str) -> Result<SourceId> {
        if identifier.is_empty() {
            return Err(DataError::InvalidArgument(
                "source identifier must not be empty".to_string(),
            ));
        }
        match identifier.strip_prefix(STORE_SCHEME) {
            None => Ok(SourceId::File(PathBuf::from(identifier))),
            Some(rest) => {
                let mut parts = rest.splitn(2, '/');
                let database = parts.next().unwrap_or("").to_string();
                if database.is_empty() {
                    return Err(DataError::InvalidArgument(format!(
                        "store identifier '{identifier}' is missing a database"
                    )));
                }
                let collection = parts
                    .next()
                    .filter(|c| !c.is_empty())
                    .map(|c| c.to_string());
                Ok(SourceId::Store {
                    database,
                    collection,
                })
            }
        }
    }

    /// Short display name: file basename or collection/database.
    fn short_name(&self) -> String {
        match self {
            SourceId::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            SourceId::Store {
                database,
                collection,
            } => collection.clone().unwrap_or_else(|| database.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata – freshly computed per load
// ---------------------------------------------------------------------------

/// Descriptive metadata about a loaded dataset, recomputed on every load.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub source: String,
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub dtypes: BTreeMap<String, ColumnType>,
}

impl Metadata {
    fn describe(source: &SourceId, dataset: &Dataset) -> Self {
        Metadata {
            source: source.short_name(),
            rows: dataset.row_count(),
            columns: dataset.column_count(),
            column_names: dataset.column_names(),
            numeric_columns: dataset.numeric_column_names(),
            dtypes: dataset
                .columns()
                .iter()
                .map(|c| (c.name.clone(), c.dtype))
                .collect(),
        }
    }
}

/// Render-ready projection: X series, numeric Y columns, X label.
/// The external renderer owns all pixel/axis decisions from here on.
#[derive(Debug, Clone)]
pub struct VisualizationData {
    pub x_label: String,
    pub x: Vec<Value>,
    pub y: Dataset,
}

// ---------------------------------------------------------------------------
// DataRepository
// ---------------------------------------------------------------------------

/// Centralized access to datasets from heterogeneous sources, with an
/// in-process cache keyed by source identifier.
///
/// Not thread-safe: the cache is a plain map with no locking, and the store
/// handle is a single reusable connection. Concurrent callers must
/// serialize access themselves.
pub struct DataRepository {
    cache: BTreeMap<String, Dataset>,
    validators: BTreeMap<String, SchemaValidator>,
    file_loader: TabularFileLoader,
    store_loader: DocumentStoreLoader,
}

impl DataRepository {
    pub fn new(store: Box<dyn DocumentStore>) -> Self {
        DataRepository {
            cache: BTreeMap::new(),
            validators: BTreeMap::new(),
            file_loader: TabularFileLoader::new(),
            store_loader: DocumentStoreLoader::new(store),
        }
    }

    /// Establish the document-store connection used by `store://` sources.
    pub fn connect_store(&mut self, uri: &str, database: &str) -> Result<bool> {
        self.store_loader.connect(uri, database)
    }

    /// Collections available on the connected store.
    pub fn list_store_collections(&self) -> Result<Vec<String>> {
        self.store_loader.list_collections()
    }

    pub fn is_cached(&self, identifier: &str) -> bool {
        self.cache.contains_key(identifier)
    }

    /// Load a dataset, from cache when possible.
    ///
    /// A cache hit returns the cached dataset without any loader I/O; a miss
    /// delegates to the loader matching the identifier, caches the result
    /// and binds a fresh [`SchemaValidator`] to the snapshot. Loader errors
    /// propagate unmodified.
    pub fn load(&mut self, identifier: &str) -> Result<(Dataset, Metadata)> {
        let source = SourceId::parse(identifier)?;
        if let Some(cached) = self.cache.get(identifier) {
            debug!("cache hit for {identifier}");
            return Ok((cached.clone(), Metadata::describe(&source, cached)));
        }

        let dataset = self.load_uncached(&source)?;
        let metadata = Metadata::describe(&source, &dataset);
        self.validators
            .insert(identifier.to_string(), SchemaValidator::new(&dataset));
        self.cache.insert(identifier.to_string(), dataset.clone());
        Ok((dataset, metadata))
    }

    fn load_uncached(&mut self, source: &SourceId) -> Result<Dataset> {
        match source {
            SourceId::File(path) => self.file_loader.load(path),
            SourceId::Store { collection, .. } => {
                let collection = collection.as_deref().ok_or_else(|| {
                    DataError::InvalidArgument(
                        "store identifier must name a collection".to_string(),
                    )
                })?;
                self.store_loader.load(collection, None, 0)
            }
        }
    }

    /// Validate one column of a previously loaded dataset.
    ///
    /// Fails with [`DataError::NotLoaded`] without a prior `load` and with
    /// [`DataError::UnknownColumn`] when the column is absent. A coercion
    /// failure is reported inside the result (`passed: false`), not as an
    /// error.
    pub fn validate_column(
        &mut self,
        identifier: &str,
        column: &str,
        expected_type: ColumnType,
        fill_value: Option<Value>,
    ) -> Result<ValidationResult> {
        let validator = self
            .validators
            .get_mut(identifier)
            .ok_or_else(|| DataError::NotLoaded(identifier.to_string()))?;

        if !validator.column_exists(column)? {
            return Err(DataError::UnknownColumn(column.to_string()));
        }
        let null_count = validator.count_nulls(&[column.to_string()])?[column];
        let actual_type = validator
            .dataset()
            .column(column)
            .map(|c| c.dtype)
            .unwrap_or(ColumnType::Text);

        let types = BTreeMap::from([(column.to_string(), expected_type)]);
        let fills = fill_value
            .clone()
            .map(|v| BTreeMap::from([(column.to_string(), v)]));

        match validator.coerce_types(&types, fills.as_ref()) {
            Ok(()) => Ok(ValidationResult {
                column: column.to_string(),
                expected_type,
                actual_type,
                null_count,
                passed: true,
                remediation: fill_value
                    .map(|v| format!("replaced {null_count} missing values with {v}")),
            }),
            Err(DataError::Validation {
                reason, examples, ..
            }) => Ok(ValidationResult {
                column: column.to_string(),
                expected_type,
                actual_type,
                null_count,
                passed: false,
                remediation: Some(format!("{reason} (samples: {})", examples.join(", "))),
            }),
            Err(other) => Err(other),
        }
    }

    /// Prepare a render-ready projection.
    ///
    /// File-backed identifiers are re-read from disk so external edits show
    /// up (falling back to the cached copy if the re-read fails);
    /// store-backed identifiers trust the cache. `max_points` is clamped to
    /// `[1, rows]` and the **last** `max_points` rows are taken. Without an
    /// `x_column` a 0-based index labelled [`INDEX_LABEL`] is synthesized;
    /// with one, text values get a best-effort timestamp conversion whose
    /// failure silently keeps the original values.
    pub fn prepare_for_visualization(
        &mut self,
        identifier: &str,
        x_column: Option<&str>,
        max_points: usize,
    ) -> Result<VisualizationData> {
        let source = SourceId::parse(identifier)?;
        let dataset = match &source {
            SourceId::File(path) => match self.file_loader.load(path) {
                Ok(fresh) => {
                    self.validators
                        .insert(identifier.to_string(), SchemaValidator::new(&fresh));
                    self.cache.insert(identifier.to_string(), fresh.clone());
                    fresh
                }
                Err(err) => match self.cache.get(identifier) {
                    Some(cached) => {
                        warn!("re-read of {identifier} failed ({err}); using cached copy");
                        cached.clone()
                    }
                    None => return Err(err),
                },
            },
            SourceId::Store { .. } => match self.cache.get(identifier) {
                Some(cached) => cached.clone(),
                None => self.load(identifier)?.0,
            },
        };

        if dataset.is_empty() {
            return Err(DataError::NoNumericData);
        }
        let max_points = max_points.clamp(1, dataset.row_count());
        let window = dataset.tail(max_points);

        let (x_label, x) = match x_column {
            None => (
                INDEX_LABEL.to_string(),
                (0..window.row_count() as i64).map(Value::Int).collect(),
            ),
            Some(name) => {
                let col = window
                    .column(name)
                    .ok_or_else(|| DataError::UnknownColumn(name.to_string()))?;
                let values = if col.dtype == ColumnType::Text {
                    convert_to_timestamps(&col.values).unwrap_or_else(|| {
                        debug!("column '{name}' did not parse as timestamps; keeping text");
                        col.values.clone()
                    })
                } else {
                    col.values.clone()
                };
                (name.to_string(), values)
            }
        };

        let mut y_names = window.numeric_column_names();
        if let Some(name) = x_column {
            if window.column(name).map(|c| c.is_numeric()).unwrap_or(false) {
                y_names.retain(|n| n != name);
            }
        }
        if y_names.is_empty() {
            return Err(DataError::NoNumericData);
        }
        let y = window.select(&y_names)?;

        Ok(VisualizationData { x_label, x, y })
    }

    /// Export a previously loaded dataset to a store collection.
    pub fn save_to_store(
        &mut self,
        identifier: &str,
        collection: &str,
        drop_existing: bool,
    ) -> Result<usize> {
        let dataset = self
            .cache
            .get(identifier)
            .cloned()
            .ok_or_else(|| DataError::NotLoaded(identifier.to_string()))?;
        self.store_loader.save(&dataset, collection, drop_existing)
    }

    /// Remove one cached entry (and its validator), or everything.
    /// A full clear also closes the document-store connection, which
    /// invalidates all store-backed entries by construction.
    pub fn clear_cache(&mut self, identifier: Option<&str>) {
        match identifier {
            Some(id) => {
                self.cache.remove(id);
                self.validators.remove(id);
                debug!("cleared cache entry for {id}");
            }
            None => {
                self.cache.clear();
                self.validators.clear();
                self.store_loader.close();
                info!("cleared the entire dataset cache");
            }
        }
    }
}

/// All-or-nothing timestamp conversion: `None` unless every non-null text
/// value parses.
fn convert_to_timestamps(values: &[Value]) -> Option<Vec<Value>> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Some(Value::Null),
            Value::Text(s) => parse_timestamp(s).map(Value::Timestamp),
            other => Some(other.clone()),
        })
        .collect()
}
