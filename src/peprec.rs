//! PEPREC derivation: normalized peptide records for the spectrum predictor.
//!
//! One record is derived per PIN row and never mutated afterwards; the set is
//! serialized to a space-separated PEPREC file with the exact column order
//! MS2PIP expects (`spec_id modifications peptide charge`) and then dropped.

use std::io::{BufWriter, Write};
use std::path::Path;

use log::{info, warn};

use crate::pin::{PinError, PinTable, SPEC_ID_COLUMN};

/// PEPREC header, fixed by the predictor's input contract.
pub const PEPREC_HEADER: &str = "spec_id modifications peptide charge";

/// Placeholder for an empty modification list in the packed encoding.
const NO_MODS: &str = "-";

/// Errors raised while deriving or writing peptide records.
#[derive(Debug, thiserror::Error)]
pub enum PeprecError {
    /// I/O error on the output file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The PIN table lacks a column the derivation needs.
    #[error(transparent)]
    Pin(#[from] PinError),

    /// Packed modification string that does not follow `pos|label|...`.
    #[error("invalid modification string {input:?}: {reason}")]
    InvalidModification {
        /// The offending packed string or inline annotation.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No usable charge for a record.
    #[error("no charge found for record {spec_id:?}")]
    MissingCharge {
        /// Key of the offending record.
        spec_id: String,
    },

    /// A field that would break the space-separated output format.
    #[error("record {spec_id:?}: {field} contains whitespace and cannot be written")]
    WhitespaceField {
        /// Key of the offending record.
        spec_id: String,
        /// Which field carries the whitespace.
        field: &'static str,
    },

    /// Failed to commit the output file.
    #[error("failed to persist PEPREC file: {0}")]
    Persist(String),
}

/// Ordered peptide modifications as `(position, label)` pairs.
///
/// Positions are 1-based residue indices; position 0 denotes an N-terminal
/// modification. The packed text encoding is `pos|label|pos|label|...`, with
/// `-` (or an empty string) for no modifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifications(Vec<(u32, String)>);

impl Modifications {
    /// Parse the packed encoding, e.g. `0|Acetyl|4|Oxidation`.
    pub fn parse(packed: &str) -> Result<Self, PeprecError> {
        let packed = packed.trim();
        if packed.is_empty() || packed == NO_MODS {
            return Ok(Self::default());
        }

        let fields: Vec<&str> = packed.split('|').collect();
        if fields.len() % 2 != 0 {
            return Err(PeprecError::InvalidModification {
                input: packed.to_string(),
                reason: "odd number of |-separated fields".into(),
            });
        }

        let mut pairs = Vec::with_capacity(fields.len() / 2);
        for chunk in fields.chunks_exact(2) {
            let position = chunk[0].parse::<u32>().map_err(|_| {
                PeprecError::InvalidModification {
                    input: packed.to_string(),
                    reason: format!("position {:?} is not an integer", chunk[0]),
                }
            })?;
            if chunk[1].is_empty() {
                return Err(PeprecError::InvalidModification {
                    input: packed.to_string(),
                    reason: "empty modification label".into(),
                });
            }
            pairs.push((position, chunk[1].to_string()));
        }
        Ok(Self(pairs))
    }

    /// Serialize to the packed encoding; `-` when empty.
    pub fn to_packed(&self) -> String {
        if self.0.is_empty() {
            return NO_MODS.to_string();
        }
        self.0
            .iter()
            .map(|(pos, label)| format!("{pos}|{label}"))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// True when no modifications are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `(position, label)` pairs in order.
    pub fn pairs(&self) -> &[(u32, String)] {
        &self.0
    }
}

impl From<Vec<(u32, String)>> for Modifications {
    fn from(pairs: Vec<(u32, String)>) -> Self {
        Self(pairs)
    }
}

/// One normalized peptide record, keyed by the PIN `SpecId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeptideRecord {
    /// Join key reused across the pipeline.
    pub spec_id: String,
    /// Bare residue string, no flanks or annotations.
    pub sequence: String,
    /// Ordered modifications.
    pub modifications: Modifications,
    /// Precursor charge state.
    pub charge: u8,
}

/// Counters reported after a derivation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    /// PIN rows examined.
    pub rows: usize,
    /// Records derived.
    pub built: usize,
    /// Rows skipped over unparseable modification annotations.
    pub skipped: usize,
}

/// Split a PIN peptide string into its bare sequence and modifications.
///
/// The column's native format is `K.PEPT[Oxidation]IDE.R`: flanking residues
/// (or `-` at a protein terminus) separated by dots, with bracketed
/// modification labels following the residue they sit on. A label before the
/// first residue is N-terminal (position 0).
pub fn parse_peptide_column(raw: &str) -> Result<(String, Modifications), PeprecError> {
    let inner = strip_flanks(raw);

    let mut sequence = String::with_capacity(inner.len());
    let mut pairs = Vec::new();
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let mut label = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    label.push(c);
                }
                if !closed {
                    return Err(PeprecError::InvalidModification {
                        input: raw.to_string(),
                        reason: "unclosed '[' annotation".into(),
                    });
                }
                if label.is_empty() {
                    return Err(PeprecError::InvalidModification {
                        input: raw.to_string(),
                        reason: "empty modification label".into(),
                    });
                }
                pairs.push((sequence.chars().count() as u32, label));
            }
            c if c.is_ascii_uppercase() => sequence.push(c),
            c => {
                return Err(PeprecError::InvalidModification {
                    input: raw.to_string(),
                    reason: format!("unexpected character {c:?} in peptide"),
                });
            }
        }
    }

    Ok((sequence, Modifications(pairs)))
}

/// Drop flanking residues (`K.PEPTIDE.R` → `PEPTIDE`) if present.
fn strip_flanks(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 5 && bytes[1] == b'.' && bytes[bytes.len() - 2] == b'.' {
        &raw[2..raw.len() - 2]
    } else {
        raw
    }
}

/// Derive one [`PeptideRecord`] per PIN row.
///
/// Rows whose peptide annotation cannot be parsed are skipped with a warning
/// and counted in [`BuildStats::skipped`]; treating them as unmodified would
/// hand the predictor a peptide it was never asked about.
pub fn build_records(table: &PinTable) -> Result<(Vec<PeptideRecord>, BuildStats), PeprecError> {
    let spec_id_col = table.column_index(SPEC_ID_COLUMN)?;
    let peptide_col = table.column_index("Peptide")?;
    let charge_cols = charge_columns(table);

    let mut records = Vec::with_capacity(table.rows.len());
    let mut stats = BuildStats::default();

    for row in &table.rows {
        stats.rows += 1;
        let spec_id = &row[spec_id_col];

        let (sequence, modifications) = match parse_peptide_column(&row[peptide_col]) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("skipping record {spec_id:?}: {e}");
                stats.skipped += 1;
                continue;
            }
        };

        let charge = extract_charge(row, &charge_cols).ok_or_else(|| {
            PeprecError::MissingCharge {
                spec_id: spec_id.clone(),
            }
        })?;

        records.push(PeptideRecord {
            spec_id: spec_id.clone(),
            sequence,
            modifications,
            charge,
        });
        stats.built += 1;
    }

    info!(
        "built {} peptide records from {} rows ({} skipped)",
        stats.built, stats.rows, stats.skipped
    );
    Ok((records, stats))
}

/// Charge column layout in the PIN table.
///
/// msgf2pin one-hot encodes the charge as `Charge1..ChargeN` feature columns;
/// a literal `Charge` column takes precedence when some other converter
/// produced the file.
enum ChargeColumns {
    Literal(usize),
    OneHot(Vec<(usize, u8)>),
}

fn charge_columns(table: &PinTable) -> ChargeColumns {
    if let Ok(idx) = table.column_index("Charge") {
        return ChargeColumns::Literal(idx);
    }
    let one_hot = table
        .header
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            name.strip_prefix("Charge")
                .and_then(|suffix| suffix.parse::<u8>().ok())
                .map(|charge| (idx, charge))
        })
        .collect();
    ChargeColumns::OneHot(one_hot)
}

fn extract_charge(row: &[String], columns: &ChargeColumns) -> Option<u8> {
    match columns {
        ChargeColumns::Literal(idx) => row[*idx].trim().parse().ok(),
        ChargeColumns::OneHot(cols) => cols
            .iter()
            .find(|(idx, _)| row[*idx].trim() == "1")
            .map(|(_, charge)| *charge),
    }
}

/// Write records to a PEPREC file, atomically.
///
/// The format is space-separated, so a spectrum title carrying a space (MGF
/// TITLE lines often do) would shift every following field by one column.
/// Such records are rejected rather than written.
pub fn write_peprec<P: AsRef<Path>>(records: &[PeptideRecord], path: P) -> Result<(), PeprecError> {
    let path = path.as_ref();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        writeln!(out, "{PEPREC_HEADER}")?;
        for record in records {
            let packed = record.modifications.to_packed();
            check_field(&record.spec_id, "spec_id", &record.spec_id)?;
            check_field(&record.spec_id, "modifications", &packed)?;
            writeln!(
                out,
                "{} {} {} {}",
                record.spec_id, packed, record.sequence, record.charge
            )?;
        }
        out.flush()?;
    }
    tmp.persist(path)
        .map_err(|e| PeprecError::Persist(e.to_string()))?;
    info!("wrote {} peptide records to {}", records.len(), path.display());
    Ok(())
}

fn check_field(spec_id: &str, field: &'static str, value: &str) -> Result<(), PeprecError> {
    if value.chars().any(char::is_whitespace) {
        return Err(PeprecError::WhitespaceField {
            spec_id: spec_id.to_string(),
            field,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn mods(pairs: &[(u32, &str)]) -> Modifications {
        Modifications::from(
            pairs
                .iter()
                .map(|(p, l)| (*p, l.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_parse_packed_modifications() {
        let parsed = Modifications::parse("0|Acetyl|4|Oxidation").unwrap();
        assert_eq!(parsed, mods(&[(0, "Acetyl"), (4, "Oxidation")]));
    }

    #[test]
    fn test_parse_empty_modifications() {
        assert!(Modifications::parse("").unwrap().is_empty());
        assert!(Modifications::parse("-").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_odd_fields() {
        assert!(matches!(
            Modifications::parse("0|Acetyl|4"),
            Err(PeprecError::InvalidModification { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_numeric_position() {
        assert!(matches!(
            Modifications::parse("x|Oxidation"),
            Err(PeprecError::InvalidModification { .. })
        ));
    }

    #[test]
    fn test_packed_round_trip() {
        let m = mods(&[(0, "Acetyl"), (4, "Oxidation")]);
        assert_eq!(m.to_packed(), "0|Acetyl|4|Oxidation");
        assert_eq!(Modifications::parse(&m.to_packed()).unwrap(), m);
        assert_eq!(Modifications::default().to_packed(), "-");
    }

    #[test]
    fn test_peptide_column_plain() {
        let (seq, m) = parse_peptide_column("K.PEPTIDE.R").unwrap();
        assert_eq!(seq, "PEPTIDE");
        assert!(m.is_empty());
    }

    #[test]
    fn test_peptide_column_with_mods() {
        let (seq, m) = parse_peptide_column("K.[Acetyl]PEPT[Oxidation]IDE.R").unwrap();
        assert_eq!(seq, "PEPTIDE");
        assert_eq!(m, mods(&[(0, "Acetyl"), (4, "Oxidation")]));
    }

    #[test]
    fn test_peptide_column_terminal_flanks() {
        let (seq, _) = parse_peptide_column("-.PEPTIDE.-").unwrap();
        assert_eq!(seq, "PEPTIDE");
        let (seq, _) = parse_peptide_column("PEPTIDE").unwrap();
        assert_eq!(seq, "PEPTIDE");
    }

    #[test]
    fn test_peptide_column_unclosed_annotation() {
        assert!(matches!(
            parse_peptide_column("K.PEPT[OxIDE.R"),
            Err(PeprecError::InvalidModification { .. })
        ));
    }

    fn sample_table() -> PinTable {
        PinTable {
            header: vec![
                "SpecId".into(),
                "Label".into(),
                "ScanNr".into(),
                "Charge2".into(),
                "Charge3".into(),
                "Peptide".into(),
                "Proteins".into(),
            ],
            default_direction: None,
            rows: vec![
                vec![
                    "spec_a".into(),
                    "1".into(),
                    "3".into(),
                    "1".into(),
                    "0".into(),
                    "K.[Acetyl]PEPT[Oxidation]IDE.R".into(),
                    "P1".into(),
                ],
                vec![
                    "spec_b".into(),
                    "-1".into(),
                    "7".into(),
                    "0".into(),
                    "1".into(),
                    "R.ELVISK.L".into(),
                    "P2".into(),
                ],
            ],
        }
    }

    #[test]
    fn test_build_records_from_pin() {
        let (records, stats) = build_records(&sample_table()).unwrap();
        assert_eq!(stats.built, 2);
        assert_eq!(stats.skipped, 0);

        assert_eq!(records[0].spec_id, "spec_a");
        assert_eq!(records[0].sequence, "PEPTIDE");
        assert_eq!(records[0].modifications, mods(&[(0, "Acetyl"), (4, "Oxidation")]));
        assert_eq!(records[0].charge, 2);

        assert_eq!(records[1].sequence, "ELVISK");
        assert!(records[1].modifications.is_empty());
        assert_eq!(records[1].charge, 3);
    }

    #[test]
    fn test_build_records_skips_bad_annotation() {
        let mut table = sample_table();
        table.rows[1][5] = "R.ELV[ISK.L".into();
        let (records, stats) = build_records(&table).unwrap();
        assert_eq!(stats.built, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_write_peprec_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.peprec");
        let records = vec![PeptideRecord {
            spec_id: "spec_a".into(),
            sequence: "PEPTIDE".into(),
            modifications: mods(&[(0, "Acetyl"), (4, "Oxidation")]),
            charge: 2,
        }];
        write_peprec(&records, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "spec_id modifications peptide charge\nspec_a 0|Acetyl|4|Oxidation PEPTIDE 2\n"
        );
    }

    #[test]
    fn test_write_peprec_rejects_spec_id_with_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.peprec");
        let records = vec![PeptideRecord {
            spec_id: "run1.3.3.2 File:run1.raw".into(),
            sequence: "PEPTIDE".into(),
            modifications: Modifications::default(),
            charge: 2,
        }];

        match write_peprec(&records, &path) {
            Err(PeprecError::WhitespaceField { spec_id, field }) => {
                assert_eq!(spec_id, "run1.3.3.2 File:run1.raw");
                assert_eq!(field, "spec_id");
            }
            other => panic!("expected WhitespaceField, got {:?}", other),
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_write_peprec_rejects_label_with_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.peprec");
        let records = vec![PeptideRecord {
            spec_id: "spec_a".into(),
            sequence: "PEPTIDE".into(),
            modifications: mods(&[(4, "Ox idation")]),
            charge: 2,
        }];

        match write_peprec(&records, &path) {
            Err(PeprecError::WhitespaceField { field, .. }) => {
                assert_eq!(field, "modifications");
            }
            other => panic!("expected WhitespaceField, got {:?}", other),
        }
    }
}
