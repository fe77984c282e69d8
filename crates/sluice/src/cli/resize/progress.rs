//! Progress spinner and the end-of-run summary.

use indicatif::{ProgressBar, ProgressStyle};
use sluice_core::{ExecutionReport, ResizeStats};

/// A spinner; the number of images is not known until the scan finishes.
pub fn create_spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} resized ({per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

/// Print a formatted summary table after the run.
pub fn print_summary(stats: &ResizeStats, report: &ExecutionReport) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Resized:      {:>8}", stats.succeeded);
    eprintln!("    Threads:      {:>8}", stats.threads);
    if stats.failed_stages > 0 {
        eprintln!("    Failed:       {:>8}", stats.failed_stages);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Duration:     {:>7}us", stats.total_micros);
    eprintln!("    Rate:         {:>7.1} img/sec", stats.images_per_second);
    eprintln!("  ====================================");

    for failure in report.failures() {
        if let Some(error) = &failure.error {
            eprintln!("    {}: {}", failure.stage, error);
        }
    }
}
