//! The `sluice resize` command: downscale a directory of images.

mod progress;
mod setup;
pub mod types;

pub use types::ReportFormat;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use sluice_core::{Config, OutputFormat, OutputWriter, ResizeJob, ResizedImage};

use progress::{create_spinner, print_summary};
use setup::{resolve_format, resolve_settings};

/// Arguments for the `resize` command.
#[derive(Args, Debug)]
pub struct ResizeArgs {
    /// Directory to read images from
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Directory to write the downscaled PNGs to (created if missing)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of worker chains [default: from config]
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Capacity of every queue between stages [default: from config]
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Write a record per resized image to this file ("-" for stdout)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Report format [default: from config]
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Hide the progress spinner
    #[arg(long)]
    pub no_progress: bool,
}

/// Execute the resize command.
pub fn execute(args: ResizeArgs, mut config: Config) -> anyhow::Result<()> {
    let settings = resolve_settings(&args, &mut config);
    let format = resolve_format(&args, &config);

    let spinner = create_spinner(args.no_progress);
    let ticker = spinner.clone();
    let job = ResizeJob::new(settings, &config)?.with_progress(move |image| {
        ticker.inc(1);
        ticker.set_message(image.output.display().to_string());
    });

    let outcome = job.run()?;
    spinner.finish_and_clear();

    if let Some(path) = &args.report {
        write_report(path, &outcome.images, format, config.output.pretty)?;
    }
    print_summary(&outcome.stats, &outcome.report);

    if !outcome.report.is_success() {
        anyhow::bail!(
            "{} stage(s) failed; {} image(s) were written",
            outcome.report.root_failure_count(),
            outcome.stats.succeeded
        );
    }
    Ok(())
}

fn write_report(
    path: &Path,
    images: &[ResizedImage],
    format: OutputFormat,
    pretty: bool,
) -> anyhow::Result<()> {
    if path == Path::new("-") {
        let stdout = std::io::stdout();
        return write_records(stdout.lock(), images, format, pretty);
    }

    let file = File::create(path)?;
    write_records(BufWriter::new(file), images, format, pretty)?;
    tracing::info!("Report written to {:?}", path);
    Ok(())
}

fn write_records<W: Write>(
    writer: W,
    images: &[ResizedImage],
    format: OutputFormat,
    pretty: bool,
) -> anyhow::Result<()> {
    let mut writer = OutputWriter::new(writer, format, pretty);
    writer.write_all(images)?;
    writer.flush()?;
    Ok(())
}
