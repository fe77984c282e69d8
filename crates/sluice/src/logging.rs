//! Subscriber setup for the `sluice` binary.
//!
//! Each pipeline stage runs on a thread named after it and logs inside a
//! `stage` span, so the human format prints thread names and the JSON format
//! attaches the current span. Everything goes to stderr because `--report -`
//! writes records to stdout.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// `verbose` lowers the default level from INFO to DEBUG and `json_format`
/// switches to one JSON object per event. `RUST_LOG` takes precedence over
/// both levels.
pub fn init(verbose: bool, json_format: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Install the subscriber described by `[logging]`. The `-v` and
/// `--json-logs` flags can only raise verbosity or switch to JSON.
pub fn init_from_config(
    config: &sluice_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let (verbose, json_format) = resolve(config, verbose_override, json_logs_override);
    init(verbose, json_format);
}

fn resolve(
    config: &sluice_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) -> (bool, bool) {
    let level = config.logging.level.to_lowercase();
    let verbose = verbose_override || level == "debug" || level == "trace";
    let json_format = json_logs_override || config.logging.format.eq_ignore_ascii_case("json");
    (verbose, json_format)
}
