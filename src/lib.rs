//! # ReScore - PSM Re-scoring Pipeline
//!
//! `rescore` chains three external tools to re-score peptide-spectrum
//! matches (PSMs): MSGF+ searches the spectra, MS2PIP predicts fragment
//! spectra for the identified peptides, and Percolator re-scores the PSMs
//! with features derived from the predicted-vs-empirical comparison. The
//! tools do the heavy lifting; this crate owns the tabular plumbing between
//! them:
//!
//! - **Tab repair** ([`pin::fix_tabs`]): the converter emits the list-valued
//!   `Proteins` column tab-separated, breaking the PIN file's declared column
//!   count. Overflow fields are re-joined with `;`.
//! - **Title mapping** ([`pin::PinTable::apply_titles`]): the engine-generated
//!   spectrum IDs are replaced by the human-readable titles recorded in the
//!   mzIdentML file, aligned strictly by record order.
//! - **Peptide records** ([`peprec`]): each PIN row is normalized into the
//!   `spec_id modifications peptide charge` record MS2PIP consumes.
//! - **Feature join** ([`features`]): the externally computed feature table is
//!   joined back onto the PIN by spectrum key; the join must be total.
//! - **Subset fan-out** ([`subsets`]): the enriched table is written as one
//!   Percolator input per named feature subset, so re-scoring results can be
//!   compared across feature sets.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use rescore::config::Config;
//! use rescore::pipeline::{run, FragMethod, RunOptions};
//!
//! let config = Config::from_file(Path::new("rescore.toml"))?;
//! let options = RunOptions {
//!     spectrum_file: "run1.mgf".into(),
//!     fasta_file: "human.fasta".into(),
//!     mods_file: None,
//!     frag_method: FragMethod::Hcd,
//! };
//! run(&config, &options)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Individual stages are also exposed on the command line (`rescore
//! fix-tabs`, `rescore map-titles`, `rescore peprec`, `rescore subsets`) so a
//! partially completed run can be resumed or inspected.
//!
//! ## Pipeline contract
//!
//! The stages are strictly sequential; each consumes a file the previous one
//! wrote. Alignment between the PIN file and the identification file is
//! order-based with no shared key, so the title mapper refuses to run when
//! the record counts diverge. Any external tool failing, timing out, or not
//! producing its expected output file aborts the run. Writers commit through
//! temporary files, so an aborted run never leaves a partially written
//! intermediate behind.

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod exec;
pub mod features;
pub mod mzid;
pub mod peprec;
pub mod pin;
pub mod pipeline;
pub mod subsets;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::exec::{expect_output, run_tool, ToolError, ToolOutput};
    pub use crate::features::{join, EnrichedTable, FeatureTable, JoinError};
    pub use crate::mzid::{read_titles, MzidError};
    pub use crate::peprec::{
        build_records, parse_peptide_column, write_peprec, Modifications, PeprecError,
        PeptideRecord,
    };
    pub use crate::pin::{fix_tabs, fix_tabs_in_place, FixStats, PinError, PinTable};
    pub use crate::pipeline::{run, FragMethod, PipelineContext, RunOptions};
    pub use crate::subsets::{standard_subsets, write_subsets, SubsetError, SubsetSpec};
}
