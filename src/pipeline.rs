//! Sequential pipeline orchestration.
//!
//! Each stage runs to completion before the next starts; every stage consumes
//! a file the previous one wrote, so there is nothing to parallelize. The
//! first error aborts the run, leaving whatever the last successful stage
//! committed (stages write atomically, so never a partial file).

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

use crate::config::Config;
use crate::exec::{expect_output, run_tool};
use crate::features::{join, FeatureTable};
use crate::mzid;
use crate::peprec::{build_records, write_peprec};
use crate::pin::{self, PinTable};
use crate::subsets::{standard_subsets, write_subsets};

/// Fragmentation method handed to the search engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FragMethod {
    /// Collision-induced dissociation.
    Cid,
    /// Higher-energy collisional dissociation (default).
    #[default]
    Hcd,
}

impl FragMethod {
    /// MSGF+ `-m` code for this method.
    pub fn msgf_code(self) -> &'static str {
        match self {
            FragMethod::Cid => "1",
            FragMethod::Hcd => "3",
        }
    }
}

/// User-facing inputs for a full pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// MS2 spectrum file (MGF), passed through to the external tools.
    pub spectrum_file: PathBuf,
    /// Protein sequence file (FASTA).
    pub fasta_file: PathBuf,
    /// Optional Mods.txt file for the search engine.
    pub mods_file: Option<PathBuf>,
    /// Fragmentation method.
    pub frag_method: FragMethod,
}

/// Resolved paths of every intermediate file, derived once from the spectrum
/// file so no stage re-invents the suffix conventions.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// The spectrum file the run started from.
    pub spectrum_file: PathBuf,
    /// Search engine output.
    pub mzid: PathBuf,
    /// Converter output, repaired and title-mapped in place.
    pub pin: PathBuf,
    /// Predictor input derived from the PIN.
    pub peprec: PathBuf,
    /// Predictor output consumed by the feature calculation.
    pub pred_and_emp: PathBuf,
    /// Feature table consumed by the join.
    pub features: PathBuf,
}

impl PipelineContext {
    /// Derive all intermediate paths from the spectrum file path.
    pub fn new(spectrum_file: &Path) -> Self {
        Self {
            spectrum_file: spectrum_file.to_path_buf(),
            mzid: with_suffix(spectrum_file, ".mzid"),
            pin: with_suffix(spectrum_file, ".pin"),
            peprec: with_suffix(spectrum_file, ".peprec"),
            pred_and_emp: with_suffix(spectrum_file, "_pred_and_emp.csv"),
            features: with_suffix(spectrum_file, "_features.csv"),
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Run the whole pipeline: search, convert, repair, title-map, derive
/// peptide records, predict, calculate features, join, fan out subsets,
/// re-score each subset.
pub fn run(config: &Config, options: &RunOptions) -> Result<()> {
    if !options.spectrum_file.exists() {
        bail!(
            "spectrum file does not exist: {}",
            options.spectrum_file.display()
        );
    }
    if !options.fasta_file.exists() {
        bail!("FASTA file does not exist: {}", options.fasta_file.display());
    }
    if config.features.command.is_empty() {
        bail!("no [features] command configured; the feature calculation step cannot run");
    }

    let ctx = PipelineContext::new(&options.spectrum_file);

    run_search(config, options, &ctx).context("search engine failed")?;
    run_converter(config, &ctx).context("mzid-to-PIN conversion failed")?;

    pin::fix_tabs_in_place(&ctx.pin).context("tab repair failed")?;

    map_titles(&ctx.pin, &ctx.mzid).context("title mapping failed")?;

    let peprec_rows = generate_peprec(&ctx.pin, &ctx.peprec).context("PEPREC generation failed")?;
    info!("PEPREC ready: {} records", peprec_rows);

    run_predictor(config, &ctx).context("spectrum prediction failed")?;
    run_feature_calc(config, &ctx).context("feature calculation failed")?;

    let written =
        generate_subsets(&ctx.pin, &ctx.features, &ctx.spectrum_file).context("subset generation failed")?;

    for subset_pin in &written {
        run_rescorer(config, subset_pin)
            .with_context(|| format!("re-scoring failed for {}", subset_pin.display()))?;
    }

    info!("pipeline finished: {} subset files re-scored", written.len());
    Ok(())
}

/// Overwrite the PIN's spectrum IDs with the titles recorded in the
/// identification file, aligning by record order. Returns the mapped count.
pub fn map_titles(pin_path: &Path, mzid_path: &Path) -> Result<usize> {
    let titles = mzid::read_titles(mzid_path)
        .with_context(|| format!("failed to read titles from {}", mzid_path.display()))?;
    let mut table = PinTable::read(pin_path)
        .with_context(|| format!("failed to read PIN file {}", pin_path.display()))?;
    table.apply_titles(&titles)?;
    table.write_atomic(pin_path)?;
    Ok(titles.len())
}

/// Derive peptide records from the PIN and write the PEPREC file. Returns
/// the record count.
pub fn generate_peprec(pin_path: &Path, peprec_path: &Path) -> Result<usize> {
    let table = PinTable::read(pin_path)
        .with_context(|| format!("failed to read PIN file {}", pin_path.display()))?;
    let (records, stats) = build_records(&table)?;
    write_peprec(&records, peprec_path)?;
    if stats.skipped > 0 {
        info!("{} records skipped during PEPREC generation", stats.skipped);
    }
    Ok(stats.built)
}

/// Join the feature table onto the PIN and write the standard subset files.
/// Returns the written paths.
pub fn generate_subsets(
    pin_path: &Path,
    features_path: &Path,
    stem: &Path,
) -> Result<Vec<PathBuf>> {
    let table = PinTable::read(pin_path)
        .with_context(|| format!("failed to read PIN file {}", pin_path.display()))?;
    let features = FeatureTable::read(features_path)
        .with_context(|| format!("failed to read feature table {}", features_path.display()))?;
    let enriched = join(&table, &features)?;
    let subsets = standard_subsets(&enriched);
    let written = write_subsets(&enriched, stem, &subsets)?;
    Ok(written)
}

fn run_search(config: &Config, options: &RunOptions, ctx: &PipelineContext) -> Result<()> {
    let jar = config.msgf.dir.join("MSGFPlus.jar");
    let mut args = vec![
        format!("-Xmx{}M", config.msgf.heap_mb),
        "-jar".into(),
        jar.display().to_string(),
        "-s".into(),
        ctx.spectrum_file.display().to_string(),
        "-d".into(),
        options.fasta_file.display().to_string(),
        "-o".into(),
        ctx.mzid.display().to_string(),
        "-t".into(),
        config.msgf.precursor_tolerance.clone(),
        "-tda".into(),
        "1".into(),
        "-m".into(),
        options.frag_method.msgf_code().into(),
    ];
    if let Some(mods) = &options.mods_file {
        args.push("-mod".into());
        args.push(mods.display().to_string());
    }

    run_tool("MSGF+", "java", &args, config.msgf.timeout())?;
    expect_output("MSGF+", &ctx.mzid)?;
    Ok(())
}

fn run_converter(config: &Config, ctx: &PipelineContext) -> Result<()> {
    // msgf2pin writes the PIN to stdout; capture it and commit the file
    // ourselves instead of relying on shell redirection.
    let args = vec![
        "-P".to_string(),
        config.converter.decoy_pattern.clone(),
        ctx.mzid.display().to_string(),
    ];
    let output = run_tool(
        "msgf2pin",
        &config.converter.path,
        &args,
        config.converter.timeout(),
    )?;
    commit(&ctx.pin, &output.stdout)
        .with_context(|| format!("failed to write {}", ctx.pin.display()))?;
    Ok(())
}

/// Commit `bytes` to `path` through a temporary file in the same directory,
/// so an interrupted run never leaves a partially written file at `path`.
fn commit(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path)?;
    Ok(())
}

fn run_predictor(config: &Config, ctx: &PipelineContext) -> Result<()> {
    let script = config.ms2pip.dir.join("ms2pipC.py");
    let args = vec![
        script.display().to_string(),
        ctx.peprec.display().to_string(),
        "-c".to_string(),
        config.ms2pip.config_file().display().to_string(),
        "-s".to_string(),
        ctx.spectrum_file.display().to_string(),
    ];
    run_tool("MS2PIP", &config.ms2pip.python, &args, config.ms2pip.timeout())?;
    expect_output("MS2PIP", &ctx.pred_and_emp)?;
    Ok(())
}

fn run_feature_calc(config: &Config, ctx: &PipelineContext) -> Result<()> {
    let program = &config.features.command[0];
    let mut args: Vec<String> = config.features.command[1..].to_vec();
    args.push(ctx.pred_and_emp.display().to_string());
    args.push(ctx.features.display().to_string());

    run_tool("feature calculation", program, &args, config.features.timeout())?;
    expect_output("feature calculation", &ctx.features)?;
    Ok(())
}

fn run_rescorer(config: &Config, subset_pin: &Path) -> Result<()> {
    let pout = subset_pin.with_extension("pout");
    let pout_dec = subset_pin.with_extension("pout_dec");
    let args = vec![
        subset_pin.display().to_string(),
        "-m".to_string(),
        pout.display().to_string(),
        "-M".to_string(),
        pout_dec.display().to_string(),
        "-v".to_string(),
        "0".to_string(),
        "-U".to_string(),
    ];
    run_tool("Percolator", &config.percolator.path, &args, config.percolator.timeout())?;
    expect_output("Percolator", &pout)?;
    Ok(())
}
