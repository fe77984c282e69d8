//! Turn CLI arguments and config into resize settings.

use sluice_core::{Config, OutputFormat, ResizeSettings};

use super::ResizeArgs;

/// Apply CLI overrides to `config` and build the settings for one run.
///
/// Missing directories are passed through as empty paths so that
/// [`ResizeSettings::prepare`] reports them.
pub fn resolve_settings(args: &ResizeArgs, config: &mut Config) -> ResizeSettings {
    if let Some(threads) = args.threads {
        config.processing.workers = threads;
    }
    if let Some(capacity) = args.capacity {
        config.engine.queue_capacity = capacity;
    }

    let input = args.input.clone().unwrap_or_default();
    let output = args.output.clone().unwrap_or_default();
    ResizeSettings::new(input, output, config)
}

/// The report format: the CLI flag if given, otherwise `[output] format`.
pub fn resolve_format(args: &ResizeArgs, config: &Config) -> OutputFormat {
    match args.format {
        Some(format) => format.into(),
        None => OutputFormat::parse(&config.output.format).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::resize::types::ReportFormat;
    use std::path::PathBuf;

    fn args() -> ResizeArgs {
        ResizeArgs {
            input: Some(PathBuf::from("/in")),
            output: Some(PathBuf::from("/out")),
            threads: None,
            capacity: None,
            report: None,
            format: None,
            no_progress: true,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let args = ResizeArgs {
            threads: Some(3),
            capacity: Some(5),
            ..args()
        };

        let settings = resolve_settings(&args, &mut config);
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.capacity, 5);
        assert_eq!(settings.input, PathBuf::from("/in"));
        assert_eq!(config.processing.workers, 3);
    }

    #[test]
    fn test_config_supplies_defaults() {
        let mut config = Config::default();
        config.processing.workers = 6;
        let settings = resolve_settings(&args(), &mut config);
        assert_eq!(settings.threads, 6);
        assert_eq!(settings.capacity, config.engine.queue_capacity);
    }

    #[test]
    fn test_missing_input_is_reported_by_prepare() {
        let mut config = Config::default();
        let args = ResizeArgs {
            input: None,
            ..args()
        };
        let settings = resolve_settings(&args, &mut config);
        let err = settings.prepare().unwrap_err();
        assert!(err.to_string().contains("no input directory"));
    }

    #[test]
    fn test_format_falls_back_to_config() {
        let mut config = Config::default();
        config.output.format = "jsonl".to_string();
        assert_eq!(resolve_format(&args(), &config), OutputFormat::JsonLines);

        let args = ResizeArgs {
            format: Some(ReportFormat::Json),
            ..args()
        };
        assert_eq!(resolve_format(&args, &config), OutputFormat::Json);
    }
}
