//! # ReScore
//!
//! Command-line front end for the PSM re-scoring pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Full pipeline: search, predict, calculate features, re-score
//! rescore run spectra.mgf proteins.fasta -c rescore.toml
//!
//! # Individual stages
//! rescore fix-tabs spectra.mgf.pin
//! rescore map-titles spectra.mgf.pin spectra.mgf.mzid
//! rescore peprec spectra.mgf.pin spectra.mgf.peprec
//! rescore subsets spectra.mgf.pin spectra.mgf_features.csv spectra.mgf
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;

use rescore::config::Config;
use rescore::pin;
use rescore::pipeline::{self, FragMethod, RunOptions};

/// ReScore - PSM re-scoring pipeline driver
#[derive(Parser)]
#[command(name = "rescore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Fragmentation method flag for the search engine.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum FragArg {
    /// Collision-induced dissociation
    Cid,
    /// Higher-energy collisional dissociation
    #[default]
    Hcd,
}

impl From<FragArg> for FragMethod {
    fn from(arg: FragArg) -> Self {
        match arg {
            FragArg::Cid => FragMethod::Cid,
            FragArg::Hcd => FragMethod::Hcd,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: search, convert, repair, predict, re-score
    Run {
        /// File containing MS2 spectra (MGF)
        #[arg(value_name = "SPECTRUM-FILE")]
        spectrum_file: PathBuf,

        /// File containing protein sequences (FASTA)
        #[arg(value_name = "FASTA-FILE")]
        fasta_file: PathBuf,

        /// Mods.txt file for the search engine
        #[arg(short = 'm', long = "mods", value_name = "FILE")]
        mods_file: Option<PathBuf>,

        /// Fragmentation method (cid or hcd)
        #[arg(short = 'f', long = "frag", default_value = "hcd", value_enum)]
        frag: FragArg,

        /// Tool configuration file (TOML)
        #[arg(short = 'c', long = "config", value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Repair a PIN file whose Proteins column was emitted tab-separated
    FixTabs {
        /// PIN file to repair
        #[arg(value_name = "PIN")]
        pin: PathBuf,

        /// Write to this path instead of repairing in place
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Overwrite PIN spectrum IDs with the titles from an mzIdentML file
    MapTitles {
        /// PIN file to rewrite in place
        #[arg(value_name = "PIN")]
        pin: PathBuf,

        /// Identification file the titles come from
        #[arg(value_name = "MZID")]
        mzid: PathBuf,
    },

    /// Derive a PEPREC file from a PIN file
    Peprec {
        /// Source PIN file
        #[arg(value_name = "PIN")]
        pin: PathBuf,

        /// Output PEPREC path
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Join a feature table onto a PIN file and write the subset files
    Subsets {
        /// Source PIN file
        #[arg(value_name = "PIN")]
        pin: PathBuf,

        /// Feature table (CSV with a spec_id column)
        #[arg(value_name = "FEATURES")]
        features: PathBuf,

        /// Output stem; subset files land at <STEM><suffix>.pin
        #[arg(value_name = "STEM")]
        stem: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            spectrum_file,
            fasta_file,
            mods_file,
            frag,
            config,
        } => run_pipeline(spectrum_file, fasta_file, mods_file, frag, config),
        Commands::FixTabs { pin, output } => run_fix_tabs(pin, output),
        Commands::MapTitles { pin, mzid } => run_map_titles(pin, mzid),
        Commands::Peprec { pin, output } => run_peprec(pin, output),
        Commands::Subsets { pin, features, stem } => run_subsets(pin, features, stem),
    }
}

fn run_pipeline(
    spectrum_file: PathBuf,
    fasta_file: PathBuf,
    mods_file: Option<PathBuf>,
    frag: FragArg,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = match config {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    info!("ReScore pipeline");
    info!("================");
    info!("Spectra: {}", spectrum_file.display());
    info!("FASTA:   {}", fasta_file.display());
    if let Some(mods) = &mods_file {
        info!("Mods:    {}", mods.display());
    }

    let options = RunOptions {
        spectrum_file,
        fasta_file,
        mods_file,
        frag_method: frag.into(),
    };
    pipeline::run(&config, &options).context("pipeline failed")?;

    info!("All done");
    Ok(())
}

fn run_fix_tabs(pin_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let stats = match output {
        Some(output) => pin::fix_tabs(&pin_path, &output)
            .with_context(|| format!("failed to repair {}", pin_path.display()))?,
        None => pin::fix_tabs_in_place(&pin_path)
            .with_context(|| format!("failed to repair {}", pin_path.display()))?,
    };
    println!(
        "{}: {} rows processed, {} repaired",
        pin_path.display(),
        stats.rows,
        stats.repaired
    );
    Ok(())
}

fn run_map_titles(pin_path: PathBuf, mzid_path: PathBuf) -> Result<()> {
    let mapped = pipeline::map_titles(&pin_path, &mzid_path)?;
    println!("{}: {} titles mapped", pin_path.display(), mapped);
    Ok(())
}

fn run_peprec(pin_path: PathBuf, output: PathBuf) -> Result<()> {
    let built = pipeline::generate_peprec(&pin_path, &output)?;
    println!("{}: {} peptide records", output.display(), built);
    Ok(())
}

fn run_subsets(pin_path: PathBuf, features_path: PathBuf, stem: PathBuf) -> Result<()> {
    let written = pipeline::generate_subsets(&pin_path, &features_path, &stem)?;
    for path in &written {
        println!("wrote {}", path.display());
    }
    Ok(())
}
