//! Feature table loading and the join back onto the PIN table.
//!
//! The predictor-derived feature table is produced externally as CSV with a
//! `spec_id` key column. The join must be total in both directions: a key on
//! one side only means the feature calculation and the search output have
//! desynchronized, and re-scoring on the partial intersection would silently
//! detach labels from features.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;

use crate::pin::{PinTable, SPEC_ID_COLUMN};

/// Key column expected in the feature table.
pub const FEATURE_KEY_COLUMN: &str = "spec_id";

/// Errors raised while reading or joining the feature table.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// I/O error on the feature file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error.
    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Feature table without the key column.
    #[error("feature table is missing its {FEATURE_KEY_COLUMN:?} column")]
    MissingKeyColumn,

    /// The PIN table lacks a required column.
    #[error(transparent)]
    Pin(#[from] crate::pin::PinError),

    /// Same key appears twice in the feature table.
    #[error("duplicate feature key {key:?}")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },

    /// A key present on one side of the join only.
    #[error("join miss: key {key:?} present in {side} only")]
    KeyMismatch {
        /// The unmatched key.
        key: String,
        /// Which input held the key.
        side: &'static str,
    },
}

/// Computed features keyed by spectrum, values kept as text verbatim.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Feature column names, key column excluded.
    pub columns: Vec<String>,
    rows: HashMap<String, Vec<String>>,
    /// Keys in file order, for deterministic mismatch reporting.
    order: Vec<String>,
}

impl FeatureTable {
    /// Read a feature CSV. The key column may appear at any position; the
    /// remaining columns keep their file order.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, JoinError> {
        let file = File::open(path.as_ref())?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));

        let headers = reader.headers()?.clone();
        let key_idx = headers
            .iter()
            .position(|h| h == FEATURE_KEY_COLUMN)
            .ok_or(JoinError::MissingKeyColumn)?;

        let columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != key_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut rows = HashMap::new();
        let mut order = Vec::new();
        for record in reader.records() {
            let record = record?;
            let key = record
                .get(key_idx)
                .unwrap_or_default()
                .to_string();
            let values: Vec<String> = record
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_idx)
                .map(|(_, v)| v.to_string())
                .collect();
            if rows.insert(key.clone(), values).is_some() {
                return Err(JoinError::DuplicateKey { key });
            }
            order.push(key);
        }

        info!(
            "read feature table: {} features for {} spectra",
            columns.len(),
            order.len()
        );
        Ok(Self { columns, rows, order })
    }

    /// Number of feature rows.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// PIN table with the feature columns appended. Transient: exists only to be
/// fanned out into subset files.
#[derive(Debug, Clone)]
pub struct EnrichedTable {
    /// Underlying table, header extended with the feature columns.
    pub table: PinTable,
    /// Names of the appended feature columns.
    pub feature_columns: Vec<String>,
}

/// Join the feature table onto the PIN rows by spectrum key.
///
/// Feature values are appended verbatim; no numeric reinterpretation. Fails
/// on the first key found on one side only.
pub fn join(pin: &PinTable, features: &FeatureTable) -> Result<EnrichedTable, JoinError> {
    let spec_id = pin.column_index(SPEC_ID_COLUMN)?;

    let mut header = pin.header.clone();
    header.extend(features.columns.iter().cloned());

    let mut pin_keys = HashSet::with_capacity(pin.rows.len());
    let mut rows = Vec::with_capacity(pin.rows.len());
    for row in &pin.rows {
        let key = &row[spec_id];
        pin_keys.insert(key.clone());
        let values = features.rows.get(key).ok_or_else(|| JoinError::KeyMismatch {
            key: key.clone(),
            side: "the PIN file",
        })?;
        let mut enriched = row.clone();
        enriched.extend(values.iter().cloned());
        rows.push(enriched);
    }

    for key in &features.order {
        if !pin_keys.contains(key) {
            return Err(JoinError::KeyMismatch {
                key: key.clone(),
                side: "the feature table",
            });
        }
    }

    // The directive row gains empty cells for the feature columns; Percolator
    // treats missing directions as unspecified.
    let default_direction = pin.default_direction.as_ref().map(|d| {
        let mut extended = d.clone();
        extended.resize(header.len(), String::new());
        extended
    });

    info!(
        "joined {} feature columns onto {} rows",
        features.columns.len(),
        rows.len()
    );
    Ok(EnrichedTable {
        table: PinTable {
            header,
            default_direction,
            rows,
        },
        feature_columns: features.columns.clone(),
    })
}
