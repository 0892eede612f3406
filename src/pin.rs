//! PIN (Percolator INput) tabular model.
//!
//! A PIN file is tab-separated with a declared header row, optionally followed
//! by a `DefaultDirection` directive row, then one data row per PSM. The last
//! declared column (`Proteins`) is list-valued; converters emit its elements
//! tab-separated, which breaks the fixed column count every other consumer
//! relies on. [`fix_tabs`] repairs that, and [`PinTable`] refuses to load
//! anything whose row shape still disagrees with the header.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, info};

/// Separator used for the list-valued `Proteins` column after repair.
/// Guaranteed not to appear in protein accessions.
pub const LIST_SEPARATOR: char = ';';

/// First field of the Percolator default-direction directive row.
pub const DEFAULT_DIRECTION: &str = "DefaultDirection";

/// Column overwritten by the title mapper and used as the join key downstream.
pub const SPEC_ID_COLUMN: &str = "SpecId";

/// Errors raised while reading, repairing or rewriting PIN files.
#[derive(Debug, thiserror::Error)]
pub enum PinError {
    /// I/O error on the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Low-level TSV parsing error.
    #[error("TSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    /// Header missing or unusable.
    #[error("malformed PIN header: {0}")]
    MalformedHeader(String),

    /// A data row whose width disagrees with the header.
    #[error("row {row}: expected {expected} fields, found {found}")]
    RowShape {
        /// 1-based data row index.
        row: usize,
        /// Declared header width.
        expected: usize,
        /// Actual field count.
        found: usize,
    },

    /// Record counts diverge between the PIN file and the identification file.
    #[error("alignment mismatch: {rows} PIN rows vs {titles} identification titles")]
    AlignmentMismatch {
        /// Number of PIN data rows.
        rows: usize,
        /// Number of titles read from the identification file.
        titles: usize,
    },

    /// A column the operation requires is not declared in the header.
    #[error("missing required PIN column: {0}")]
    MissingColumn(String),

    /// Failed to commit an atomic rewrite.
    #[error("failed to persist rewritten file: {0}")]
    Persist(String),
}

/// An in-memory PIN table with a validated, rectangular shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PinTable {
    /// Declared column names, in file order.
    pub header: Vec<String>,
    /// Optional `DefaultDirection` directive row, tag included in the first
    /// field, padded to header width.
    pub default_direction: Option<Vec<String>>,
    /// Data rows; every row has exactly `header.len()` fields.
    pub rows: Vec<Vec<String>>,
}

impl PinTable {
    /// Read a PIN file, enforcing that every data row matches the header
    /// width. Run [`fix_tabs`] first on converter output.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, PinError> {
        let file = File::open(path.as_ref())?;
        let mut reader = tsv_reader(BufReader::new(file));

        let mut records = reader.records();
        let header: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(str::to_string).collect(),
            None => return Err(PinError::MalformedHeader("empty file".into())),
        };
        validate_header(&header)?;

        let mut default_direction = None;
        let mut rows = Vec::new();

        for record in records {
            let record = record?;
            let fields: Vec<String> = record.iter().map(str::to_string).collect();

            if rows.is_empty()
                && default_direction.is_none()
                && fields.first().map(String::as_str) == Some(DEFAULT_DIRECTION)
            {
                if fields.len() > header.len() {
                    return Err(PinError::RowShape {
                        row: 0,
                        expected: header.len(),
                        found: fields.len(),
                    });
                }
                let mut fields = fields;
                fields.resize(header.len(), String::new());
                default_direction = Some(fields);
                continue;
            }

            if fields.len() != header.len() {
                return Err(PinError::RowShape {
                    row: rows.len() + 1,
                    expected: header.len(),
                    found: fields.len(),
                });
            }
            rows.push(fields);
        }

        debug!("read PIN table: {} columns, {} rows", header.len(), rows.len());
        Ok(Self {
            header,
            default_direction,
            rows,
        })
    }

    /// Write the table to `path`, replacing any existing file.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), PinError> {
        let file = File::create(path.as_ref())?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Rewrite `path` atomically: the new content lands in a temporary file
    /// beside the target and replaces it only once fully written, so a failed
    /// stage never leaves a half-written PIN behind.
    pub fn write_atomic<P: AsRef<Path>>(&self, path: P) -> Result<(), PinError> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(&mut tmp)?;
        tmp.flush()?;
        tmp.persist(path)
            .map_err(|e| PinError::Persist(e.to_string()))?;
        Ok(())
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<(), PinError> {
        write_tsv_line(out, &self.header)?;
        if let Some(direction) = &self.default_direction {
            write_tsv_line(out, direction)?;
        }
        for row in &self.rows {
            write_tsv_line(out, row)?;
        }
        Ok(())
    }

    /// Index of a named column, or a `MissingColumn` error.
    pub fn column_index(&self, name: &str) -> Result<usize, PinError> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PinError::MissingColumn(name.to_string()))
    }

    /// Overwrite each row's `SpecId` with the corresponding spectrum title,
    /// aligning by record order.
    ///
    /// Order alignment is the only available join: the PIN and the
    /// identification file carry no shared key, they are merely produced in
    /// lockstep by the same search run. The count check below is therefore a
    /// hard precondition; zipping mismatched files would silently attach
    /// titles to the wrong PSMs.
    pub fn apply_titles(&mut self, titles: &[String]) -> Result<(), PinError> {
        if titles.len() != self.rows.len() {
            return Err(PinError::AlignmentMismatch {
                rows: self.rows.len(),
                titles: titles.len(),
            });
        }
        let spec_id = self.column_index(SPEC_ID_COLUMN)?;
        for (row, title) in self.rows.iter_mut().zip(titles) {
            row[spec_id] = title.clone();
        }
        info!("mapped {} spectrum titles onto {}", titles.len(), SPEC_ID_COLUMN);
        Ok(())
    }
}

/// Row counts reported by [`fix_tabs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FixStats {
    /// Data rows processed.
    pub rows: usize,
    /// Rows whose overflow fields were re-joined.
    pub repaired: usize,
}

/// Repair a converter-written PIN file whose list-valued trailing column
/// (`Proteins`) was emitted tab-separated.
///
/// The header declares N columns; any data row with more than N fields has
/// fields N-1.. re-joined with [`LIST_SEPARATOR`] into the final column. Rows
/// already at N fields pass through unchanged, so the operation is idempotent.
/// Rows with fewer than N fields are malformed input.
pub fn fix_tabs<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> Result<FixStats, PinError> {
    let file = File::open(input.as_ref())?;
    let mut reader = tsv_reader(BufReader::new(file));

    let mut records = reader.records();
    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => return Err(PinError::MalformedHeader("empty file".into())),
    };
    validate_header(&header)?;
    let width = header.len();

    let out = File::create(output.as_ref())?;
    let mut out = BufWriter::new(out);
    write_tsv_line(&mut out, &header)?;

    let mut stats = FixStats::default();
    let mut seen_data = false;

    for record in records {
        let record = record?;
        let mut fields: Vec<String> = record.iter().map(str::to_string).collect();

        // The optional directive row declares per-feature defaults and may be
        // shorter than the header; pad rather than reject it.
        if !seen_data && fields.first().map(String::as_str) == Some(DEFAULT_DIRECTION) {
            while fields.len() < width {
                fields.push(String::new());
            }
        } else {
            seen_data = true;
            stats.rows += 1;
            if fields.len() < width {
                return Err(PinError::RowShape {
                    row: stats.rows,
                    expected: width,
                    found: fields.len(),
                });
            }
        }

        if fields.len() > width {
            let overflow = fields.split_off(width - 1);
            fields.push(overflow.join(&LIST_SEPARATOR.to_string()));
            stats.repaired += 1;
        }
        write_tsv_line(&mut out, &fields)?;
    }

    out.flush()?;
    info!(
        "fixed tabs: {} rows processed, {} repaired",
        stats.rows, stats.repaired
    );
    Ok(stats)
}

/// In-place variant of [`fix_tabs`]: repairs into a temporary file beside the
/// target and renames over it on success.
pub fn fix_tabs_in_place<P: AsRef<Path>>(path: P) -> Result<FixStats, PinError> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let stats = fix_tabs(path, tmp.path())?;
    tmp.persist(path)
        .map_err(|e| PinError::Persist(e.to_string()))?;
    Ok(stats)
}

fn validate_header(header: &[String]) -> Result<(), PinError> {
    if header.is_empty() || header.iter().all(|h| h.trim().is_empty()) {
        return Err(PinError::MalformedHeader("no columns declared".into()));
    }
    Ok(())
}

fn tsv_reader<R: std::io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader)
}

fn write_tsv_line<W: Write>(out: &mut W, fields: &[String]) -> Result<(), PinError> {
    writeln!(out, "{}", fields.join("\t"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    const HEADER: &str = "SpecId\tLabel\tScanNr\tRawScore\tPeptide\tProteins";

    #[test]
    fn test_fix_tabs_joins_overflow() {
        let dir = tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "in.pin",
            &format!("{HEADER}\nid_1\t1\t12\t0.5\tK.PEPTIDE.R\tsp|P1\tsp|P2\tsp|P3\n"),
        );
        let output = dir.path().join("out.pin");

        let stats = fix_tabs(&input, &output).unwrap();
        assert_eq!(stats.rows, 1);
        assert_eq!(stats.repaired, 1);

        let table = PinTable::read(&output).unwrap();
        assert_eq!(table.rows[0][5], "sp|P1;sp|P2;sp|P3");
        // Splitting on the new separator recovers the original elements.
        let proteins: Vec<&str> = table.rows[0][5].split(LIST_SEPARATOR).collect();
        assert_eq!(proteins, vec!["sp|P1", "sp|P2", "sp|P3"]);
    }

    #[test]
    fn test_fix_tabs_passes_exact_width_through() {
        let dir = tempdir().unwrap();
        let content = format!("{HEADER}\nid_1\t1\t12\t0.5\tK.PEPTIDE.R\tsp|P1\n");
        let input = write_file(dir.path(), "in.pin", &content);
        let output = dir.path().join("out.pin");

        let stats = fix_tabs(&input, &output).unwrap();
        assert_eq!(stats.repaired, 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), content);
    }

    #[test]
    fn test_fix_tabs_is_idempotent() {
        let dir = tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "in.pin",
            &format!("{HEADER}\nid_1\t1\t12\t0.5\tK.PEPTIDE.R\tsp|P1\tsp|P2\n"),
        );
        let once = dir.path().join("once.pin");
        let twice = dir.path().join("twice.pin");

        fix_tabs(&input, &once).unwrap();
        fix_tabs(&once, &twice).unwrap();
        assert_eq!(
            fs::read_to_string(&once).unwrap(),
            fs::read_to_string(&twice).unwrap()
        );
    }

    #[test]
    fn test_fix_tabs_rejects_short_row() {
        let dir = tempdir().unwrap();
        let input = write_file(dir.path(), "in.pin", &format!("{HEADER}\nid_1\t1\t12\n"));
        let output = dir.path().join("out.pin");

        match fix_tabs(&input, &output) {
            Err(PinError::RowShape { row, expected, found }) => {
                assert_eq!(row, 1);
                assert_eq!(expected, 6);
                assert_eq!(found, 3);
            }
            other => panic!("expected RowShape error, got {:?}", other),
        }
    }

    #[test]
    fn test_fix_tabs_rejects_empty_file() {
        let dir = tempdir().unwrap();
        let input = write_file(dir.path(), "in.pin", "");
        let output = dir.path().join("out.pin");
        assert!(matches!(
            fix_tabs(&input, &output),
            Err(PinError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_fix_tabs_preserves_default_direction() {
        let dir = tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "in.pin",
            &format!(
                "{HEADER}\nDefaultDirection\t-\t-\t1\t-\t-\nid_1\t1\t12\t0.5\tK.PEPTIDE.R\tsp|P1\n"
            ),
        );
        let output = dir.path().join("out.pin");
        fix_tabs(&input, &output).unwrap();

        let table = PinTable::read(&output).unwrap();
        assert_eq!(
            table.default_direction,
            Some(vec![
                "DefaultDirection".into(),
                "-".into(),
                "-".into(),
                "1".into(),
                "-".into(),
                "-".into(),
            ])
        );
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_read_rejects_ragged_row() {
        let dir = tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "in.pin",
            &format!("{HEADER}\nid_1\t1\t12\t0.5\tK.PEPTIDE.R\tsp|P1\tsp|P2\n"),
        );
        assert!(matches!(
            PinTable::read(&input),
            Err(PinError::RowShape { row: 1, .. })
        ));
    }

    #[test]
    fn test_apply_titles_in_order() {
        let mut table = PinTable {
            header: vec!["SpecId".into(), "Label".into(), "Proteins".into()],
            default_direction: None,
            rows: vec![
                vec!["_SII_1".into(), "1".into(), "P1".into()],
                vec!["_SII_2".into(), "-1".into(), "P2".into()],
                vec!["_SII_3".into(), "1".into(), "P3".into()],
            ],
        };
        let titles = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        table.apply_titles(&titles).unwrap();

        let ids: Vec<&str> = table.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_apply_titles_count_mismatch_changes_nothing() {
        let mut table = PinTable {
            header: vec!["SpecId".into(), "Label".into()],
            default_direction: None,
            rows: vec![
                vec!["_SII_1".into(), "1".into()],
                vec!["_SII_2".into(), "-1".into()],
                vec!["_SII_3".into(), "1".into()],
            ],
        };
        let before = table.clone();
        let titles: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();

        match table.apply_titles(&titles) {
            Err(PinError::AlignmentMismatch { rows, titles }) => {
                assert_eq!(rows, 3);
                assert_eq!(titles, 4);
            }
            other => panic!("expected AlignmentMismatch, got {:?}", other),
        }
        assert_eq!(table, before);
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let table = PinTable {
            header: vec!["SpecId".into(), "Label".into(), "Proteins".into()],
            default_direction: Some(vec![
                "DefaultDirection".into(),
                "1".into(),
                "-".into(),
            ]),
            rows: vec![vec!["spec_a".into(), "1".into(), "P1;P2".into()]],
        };
        let path = dir.path().join("round.pin");
        table.write_atomic(&path).unwrap();
        assert_eq!(PinTable::read(&path).unwrap(), table);
    }

    proptest! {
        /// Any table already at header width is a fixed point of fix_tabs.
        #[test]
        fn fix_tabs_idempotent_on_well_formed(
            rows in prop::collection::vec(
                prop::collection::vec("[A-Za-z0-9_.|-]{1,10}", 4..=4),
                0..20,
            )
        ) {
            let dir = tempdir().unwrap();
            let mut content = String::from("SpecId\tLabel\tPeptide\tProteins\n");
            for row in &rows {
                content.push_str(&row.join("\t"));
                content.push('\n');
            }
            let input = write_file(dir.path(), "in.pin", &content);
            let output = dir.path().join("out.pin");

            fix_tabs(&input, &output).unwrap();
            prop_assert_eq!(fs::read_to_string(&output).unwrap(), content);
        }
    }
}
