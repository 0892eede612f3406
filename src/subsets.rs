//! Fan-out of the enriched table into per-subset re-scoring input files.
//!
//! Each named subset keeps a different slice of the feature columns so the
//! re-scorer's results can be compared across feature sets. The structural
//! columns Percolator requires are present in every file regardless of
//! subset: `SpecId`, `Label`, `ScanNr` lead and `Peptide`, `Proteins` trail.

use std::path::{Path, PathBuf};

use log::info;

use crate::features::EnrichedTable;
use crate::pin::{PinError, PinTable};

/// Columns every output file starts with.
pub const LEADING_COLUMNS: [&str; 3] = ["SpecId", "Label", "ScanNr"];

/// Columns every output file ends with.
pub const TRAILING_COLUMNS: [&str; 2] = ["Peptide", "Proteins"];

/// Errors raised while writing subset files.
#[derive(Debug, thiserror::Error)]
pub enum SubsetError {
    /// Underlying table error (missing column, write failure).
    #[error(transparent)]
    Pin(#[from] PinError),

    /// A subset names a column the enriched table does not have.
    #[error("subset {suffix:?} references unknown column {column:?}")]
    UnknownColumn {
        /// Subset file suffix.
        suffix: String,
        /// The column it asked for.
        column: String,
    },
}

/// One named column subset: a file suffix plus the feature columns it keeps.
#[derive(Debug, Clone)]
pub struct SubsetSpec {
    /// Appended to the output stem, e.g. `_only_rescore`.
    pub suffix: String,
    /// Feature columns kept, in output order. Structural columns are implied.
    pub columns: Vec<String>,
}

impl SubsetSpec {
    /// Create a subset spec.
    pub fn new(suffix: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            suffix: suffix.into(),
            columns,
        }
    }
}

/// The three comparison subsets the pipeline emits: predictor-derived
/// features only, search-engine features only, and the union of both.
pub fn standard_subsets(enriched: &EnrichedTable) -> Vec<SubsetSpec> {
    let engine: Vec<String> = engine_feature_columns(enriched);
    let rescore = enriched.feature_columns.clone();
    let mut all = engine.clone();
    all.extend(rescore.iter().cloned());

    vec![
        SubsetSpec::new("_only_rescore", rescore),
        SubsetSpec::new("_all_percolator", engine),
        SubsetSpec::new("_all_features", all),
    ]
}

/// Search-engine feature columns: everything in the original PIN header that
/// is neither structural nor predictor-derived.
fn engine_feature_columns(enriched: &EnrichedTable) -> Vec<String> {
    enriched
        .table
        .header
        .iter()
        .filter(|name| {
            !LEADING_COLUMNS.contains(&name.as_str())
                && !TRAILING_COLUMNS.contains(&name.as_str())
                && !enriched.feature_columns.contains(name)
        })
        .cloned()
        .collect()
}

/// Write one PIN file per subset next to `stem`, named `<stem><suffix>.pin`.
/// Returns the written paths in subset order.
pub fn write_subsets(
    enriched: &EnrichedTable,
    stem: &Path,
    subsets: &[SubsetSpec],
) -> Result<Vec<PathBuf>, SubsetError> {
    let mut written = Vec::with_capacity(subsets.len());
    for subset in subsets {
        let path = subset_path(stem, subset);
        let projected = project(enriched, subset)?;
        projected.write_atomic(&path)?;
        info!(
            "wrote subset {}: {} columns, {} rows -> {}",
            subset.suffix,
            projected.header.len(),
            projected.rows.len(),
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}

fn subset_path(stem: &Path, subset: &SubsetSpec) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(&subset.suffix);
    name.push(".pin");
    PathBuf::from(name)
}

/// Project the enriched table onto one subset's columns.
fn project(enriched: &EnrichedTable, subset: &SubsetSpec) -> Result<PinTable, SubsetError> {
    let table = &enriched.table;

    let mut names: Vec<&str> = LEADING_COLUMNS.to_vec();
    names.extend(subset.columns.iter().map(String::as_str));
    names.extend(TRAILING_COLUMNS);

    let mut indices = Vec::with_capacity(names.len());
    for name in &names {
        let idx = table.column_index(name).map_err(|e| match e {
            PinError::MissingColumn(column) => SubsetError::UnknownColumn {
                suffix: subset.suffix.clone(),
                column,
            },
            other => SubsetError::Pin(other),
        })?;
        indices.push(idx);
    }

    let pick = |row: &Vec<String>| -> Vec<String> {
        indices.iter().map(|&i| row[i].clone()).collect()
    };

    Ok(PinTable {
        header: names.iter().map(|s| s.to_string()).collect(),
        default_direction: table.default_direction.as_ref().map(|d| pick(d)),
        rows: table.rows.iter().map(pick).collect(),
    })
}
