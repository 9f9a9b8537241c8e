//! dwca-normalize - rebuild the classification of a Darwin Core Archive

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dwca_common::logging::{init_logging, LogConfig, LogLevel};
use dwca_normalizer::{
    ArchiveDescriptor, ClassificationNormalizer, NormalizationReport, NormalizerConfig,
    SummaryReport, TracingSink,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dwca-normalize")]
#[command(author, version, about = "Normalize the classification of a Darwin Core Archive")]
struct Cli {
    /// JSON archive descriptor (core table plus extensions)
    descriptor: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip canonical name computation
    #[arg(long)]
    no_canonical_names: bool,

    /// Skip synonym and vernacular name extensions
    #[arg(long)]
    no_extensions: bool,

    /// Rows per ingestion batch
    #[arg(short, long, env = "DWCA_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Only print counts
    #[arg(short, long)]
    summary: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("dwca-normalize")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = NormalizerConfig::load().context("Invalid normalizer configuration")?;
    if let Some(batch_size) = cli.batch_size {
        config = config.with_batch_size(batch_size);
    }
    if cli.no_canonical_names {
        config = config.with_canonical_names(false);
    }
    if cli.no_extensions {
        config = config.with_extensions(false);
    }
    config.validate()?;

    let archive = ArchiveDescriptor::from_path(&cli.descriptor)
        .with_context(|| format!("Failed to load descriptor {}", cli.descriptor.display()))?;

    info!(descriptor = %cli.descriptor.display(), "Normalizing archive");

    let options = config.options();
    let mut normalizer = ClassificationNormalizer::new(&archive)?
        .with_sink(TracingSink)
        .with_config(config);
    normalizer.normalize(options).context("Normalization failed")?;

    let mut writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    if cli.summary {
        SummaryReport::new(&normalizer).write_json(&mut writer)?;
    } else {
        NormalizationReport::new(&normalizer).write_json(&mut writer)?;
    }
    writeln!(writer)?;
    writer.flush()?;

    let stats = normalizer.stats();
    info!(
        taxa = stats.taxa,
        resolved = stats.resolved_paths,
        errors = stats.errors,
        "Normalization complete"
    );
    Ok(())
}
