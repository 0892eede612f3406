//! mzIdentML reader, limited to spectrum-title extraction.
//!
//! The search engine's identification file is only consulted for the
//! human-readable spectrum titles it records per identification result, in
//! declaration order. Everything else in the document is skipped.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// HUPO-PSI accession for "spectrum title".
const SPECTRUM_TITLE_ACCESSION: &str = "MS:1000796";

/// Element whose cvParams carry the per-spectrum titles.
const RESULT_ELEMENT: &[u8] = b"SpectrumIdentificationResult";

/// Errors raised while reading the identification file.
#[derive(Debug, thiserror::Error)]
pub enum MzidError {
    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// I/O error on the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attribute value was not valid UTF-8.
    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Read every spectrum title declared in an mzIdentML file, in document
/// order.
///
/// Titles are carried as `<cvParam accession="MS:1000796" value="..."/>`
/// elements inside `SpectrumIdentificationResult`; their document order
/// matches the order in which the converter emits PIN rows, which is the
/// contract the title mapper depends on. The same accession in file-level
/// metadata is not a per-spectrum title and is skipped.
pub fn read_titles<P: AsRef<Path>>(path: P) -> Result<Vec<String>, MzidError> {
    let file = File::open(path.as_ref())?;
    let mut reader = Reader::from_reader(BufReader::with_capacity(64 * 1024, file));
    reader.config_mut().trim_text(true);

    let mut titles = Vec::new();
    let mut buf = Vec::new();
    let mut result_depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if e.local_name().as_ref() == RESULT_ELEMENT => {
                result_depth += 1;
            }
            Event::End(ref e) if e.local_name().as_ref() == RESULT_ELEMENT => {
                result_depth = result_depth.saturating_sub(1);
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if result_depth > 0 && e.local_name().as_ref() == b"cvParam" =>
            {
                if let Some(title) = title_value(e)? {
                    titles.push(title);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    info!(
        "read {} spectrum titles from {}",
        titles.len(),
        path.as_ref().display()
    );
    Ok(titles)
}

/// Extract the `value` attribute if this cvParam is a spectrum title.
fn title_value(element: &BytesStart<'_>) -> Result<Option<String>, MzidError> {
    let mut accession_matches = false;
    let mut value = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| MzidError::Xml(quick_xml::Error::from(e)))?;
        match attr.key.local_name().as_ref() {
            b"accession" => {
                accession_matches = attr.value.as_ref() == SPECTRUM_TITLE_ACCESSION.as_bytes();
            }
            b"value" => {
                value = Some(std::str::from_utf8(&attr.value)?.to_string());
            }
            _ => {}
        }
    }

    Ok(if accession_matches { value } else { None })
}
