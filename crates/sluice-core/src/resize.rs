//! The mipmap job: scan → load → resize → save, fanned out over workers.
//!
//! ```text
//!                    ┌─ load-0* → resize-0 → save-0 ─┐
//! scan* → distribute ┼─ load-1* → resize-1 → save-1 ─┼ merge* → collect
//!                    └─ ...                         ─┘
//! ```
//!
//! Stages marked `*` are active. The distributor runs on the scan thread and
//! each worker's resize and save run on that worker's load thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{expand_path, Config};
use crate::engine::{Collected, ExecutionReport, Pipeline};
use crate::error::{ConfigError, ImageError, Result, SluiceError};
use crate::imaging::{DiscoveredFile, FileDiscovery, ImageLoader, ImageSaver, LoadedImage, Resizer};
use crate::types::{ResizeStats, ResizedImage};

/// Where to read from and write to, and how wide to fan out.
#[derive(Debug, Clone)]
pub struct ResizeSettings {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Number of worker chains
    pub threads: usize,
    /// Capacity of every queue in the graph
    pub capacity: usize,
}

impl ResizeSettings {
    /// Settings with thread count and capacity taken from `config`.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            input: expand_path(&input.into()),
            output: expand_path(&output.into()),
            threads: config.processing.workers,
            capacity: config.engine.queue_capacity,
        }
    }

    /// Check the settings and create the output directory if it is missing.
    pub fn prepare(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(invalid("number of threads must be > 0"));
        }
        if self.capacity == 0 {
            return Err(invalid("queue capacity must be > 0"));
        }
        if self.input.as_os_str().is_empty() {
            return Err(invalid("no input directory"));
        }
        if !self.input.is_dir() {
            return Err(invalid(format!(
                "input directory does not exist: {}",
                self.input.display()
            )));
        }
        if self.output.as_os_str().is_empty() {
            return Err(invalid("no output directory"));
        }
        if !self.output.is_dir() {
            std::fs::create_dir_all(&self.output).map_err(|source| ImageError::CreateDir {
                path: self.output.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> SluiceError {
    ConfigError::ValidationError(message.into()).into()
}

type ProgressFn = Arc<dyn Fn(&ResizedImage) + Send + Sync>;

/// A configured resize run.
pub struct ResizeJob {
    settings: ResizeSettings,
    discovery: FileDiscovery,
    loader: ImageLoader,
    resizer: Resizer,
    saver: ImageSaver,
    progress: Option<ProgressFn>,
}

/// Everything a finished run produced.
pub struct ResizeOutcome {
    /// Records in merge order (not input order)
    pub images: Vec<ResizedImage>,
    pub report: ExecutionReport,
    pub stats: ResizeStats,
}

impl ResizeJob {
    pub fn new(settings: ResizeSettings, config: &Config) -> Result<Self> {
        let resizer = Resizer::from_config(&config.resize)?;
        let saver = ImageSaver::new(
            settings.output.clone(),
            config.resize.output_extension.clone(),
        );
        Ok(Self {
            settings,
            discovery: FileDiscovery::new(config.processing.clone()),
            loader: ImageLoader::new(config.limits.clone()),
            resizer,
            saver,
            progress: None,
        })
    }

    /// Call `f` on the collector thread for every saved image.
    pub fn with_progress(mut self, f: impl Fn(&ResizedImage) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn settings(&self) -> &ResizeSettings {
        &self.settings
    }

    /// Build the graph without running it.
    pub fn assemble(&self) -> Result<(Pipeline, Collected<ResizedImage>)> {
        let mut pipeline = Pipeline::with_capacity(self.settings.capacity);

        let scan = pipeline.add_source("scan", self.files());
        pipeline.declare_active(&scan)?;
        let distribute = pipeline.add_distributor::<DiscoveredFile>("distribute");
        pipeline.connect(scan.output(), distribute.input())?;

        let merge = pipeline.add_merger::<ResizedImage>("merge");
        pipeline.declare_active(&merge)?;

        let collected = Collected::new();
        let sink = collected.clone();
        let progress = self.progress.clone();
        let collect = pipeline.add_sink("collect", move |image: ResizedImage| {
            if let Some(progress) = &progress {
                progress(&image);
            }
            sink.push(image);
            Ok(())
        });
        pipeline.connect(merge.output(), collect.input())?;

        for worker in 0..self.settings.threads {
            let loader = self.loader.clone();
            let load = pipeline.add_transform(format!("load-{worker}"), move |file: DiscoveredFile| {
                Ok(Some(loader.load(&file)?))
            });
            pipeline.declare_active(&load)?;

            let resizer = self.resizer;
            let resize = pipeline.add_map(format!("resize-{worker}"), move |image: LoadedImage| {
                resizer.apply(image)
            });

            let saver = self.saver.clone();
            let save = pipeline.add_transform(format!("save-{worker}"), move |image: LoadedImage| {
                Ok(Some(saver.save(image)?))
            });

            let fanned = pipeline.new_output_port(&distribute)?;
            pipeline.connect(fanned, load.input())?;
            pipeline.connect(load.output(), resize.input())?;
            pipeline.connect(resize.output(), save.input())?;
            let merged = pipeline.new_input_port(&merge)?;
            pipeline.connect(save.output(), merged)?;
        }

        Ok((pipeline, collected))
    }

    /// The files to resize. Read up front when the outputs are written into
    /// the input directory, so that they are never picked up as inputs.
    fn files(&self) -> Box<dyn Iterator<Item = DiscoveredFile> + Send> {
        let scan = self.discovery.scan(&self.settings.input);
        if self.writes_into_input() {
            tracing::debug!("Output directory is the input directory, listing inputs first");
            Box::new(scan.collect::<Vec<_>>().into_iter())
        } else {
            Box::new(scan)
        }
    }

    fn writes_into_input(&self) -> bool {
        let ResizeSettings { input, output, .. } = &self.settings;
        match (input.canonicalize(), output.canonicalize()) {
            (Ok(input), Ok(output)) => input == output,
            _ => input == output,
        }
    }

    /// Prepare the directories, run the graph to completion, and gather the
    /// results.
    pub fn run(self) -> Result<ResizeOutcome> {
        self.settings.prepare()?;
        let (pipeline, collected) = self.assemble()?;

        let start = Instant::now();
        let report = pipeline.execute_blocking()?;
        let elapsed = start.elapsed();

        tracing::info!(
            "threads: {}, time: {}us",
            self.settings.threads,
            elapsed.as_micros()
        );

        let images = collected.take();
        let seconds = elapsed.as_secs_f64();
        let stats = ResizeStats {
            succeeded: images.len(),
            failed_stages: report.root_failure_count(),
            threads: self.settings.threads,
            images_per_second: if seconds > 0.0 {
                images.len() as f64 / seconds
            } else {
                0.0
            },
            total_micros: elapsed.as_micros(),
        };
        Ok(ResizeOutcome {
            images,
            report,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, ImageFormat};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        DynamicImage::new_rgb8(width, height)
            .save_with_format(dir.join(name), ImageFormat::Png)
            .unwrap();
    }

    fn settings(input: &Path, output: &Path, threads: usize) -> ResizeSettings {
        ResizeSettings {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            threads,
            capacity: 2,
        }
    }

    #[test]
    fn test_assemble_builds_one_chain_per_thread() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let job = ResizeJob::new(settings(input.path(), output.path(), 3), &Config::default())
            .unwrap();

        let (pipeline, _) = job.assemble().unwrap();
        // scan, distribute, merge, collect + 3 per worker
        assert_eq!(pipeline.stage_count(), 4 + 3 * 3);
        // scan, merge + one load per worker
        assert_eq!(pipeline.active_count(), 2 + 3);
        pipeline.validate().unwrap();
    }

    #[test]
    fn test_run_resizes_every_image() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for i in 0..6 {
            write_png(input.path(), &format!("img{i}.png"), 32, 16);
        }
        std::fs::write(input.path().join("readme.txt"), b"not an image").unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let job = ResizeJob::new(settings(input.path(), output.path(), 2), &Config::default())
            .unwrap()
            .with_progress(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let outcome = job.run().unwrap();
        assert!(outcome.report.is_success());
        assert_eq!(outcome.stats.succeeded, 6);
        assert_eq!(seen.load(Ordering::SeqCst), 6);

        for i in 0..6 {
            let path = output.path().join(format!("img{i}.png.png"));
            let written = image::open(&path).unwrap();
            assert_eq!(written.dimensions(), (16, 8));
        }
    }

    #[test]
    fn test_broken_image_only_ends_its_worker() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("a_broken.png"), b"garbage").unwrap();
        for i in 0..5 {
            write_png(input.path(), &format!("b{i}.png"), 8, 8);
        }

        let job = ResizeJob::new(settings(input.path(), output.path(), 2), &Config::default())
            .unwrap();
        let outcome = job.run().unwrap();

        assert_eq!(outcome.report.failure_count(), 1);
        assert!(!outcome.stats.is_success());
        assert!(!outcome.images.is_empty() && outcome.images.len() < 6);
        assert!(outcome
            .images
            .iter()
            .all(|image| image.output.starts_with(output.path())));
    }

    #[test]
    fn test_output_inside_input_is_not_rescanned() {
        let input = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png"] {
            write_png(input.path(), name, 8, 8);
        }
        let output = input.path().join("b_out");
        let job = ResizeJob::new(
            ResizeSettings {
                capacity: 1,
                ..settings(input.path(), &output, 1)
            },
            &Config::default(),
        )
        .unwrap();

        let outcome = job.run().unwrap();
        assert!(outcome.report.is_success());
        assert_eq!(outcome.images.len(), 4);
        assert_eq!(std::fs::read_dir(&output).unwrap().count(), 4);
        assert!(!output.join("b.png.png.png").exists());
    }

    #[test]
    fn test_output_equal_to_input_resizes_each_file_once() {
        let input = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png", "c.png", "d.png"] {
            write_png(input.path(), name, 8, 8);
        }
        let job = ResizeJob::new(
            ResizeSettings {
                capacity: 1,
                ..settings(input.path(), input.path(), 1)
            },
            &Config::default(),
        )
        .unwrap();

        let outcome = job.run().unwrap();
        assert!(outcome.report.is_success());
        assert_eq!(outcome.images.len(), 4);
        assert_eq!(std::fs::read_dir(input.path()).unwrap().count(), 8);
    }

    #[test]
    fn test_files_in_subdirectories_are_ignored() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(input.path().join("a")).unwrap();
        std::fs::create_dir_all(input.path().join("b")).unwrap();
        write_png(&input.path().join("a"), "x.png", 8, 8);
        write_png(&input.path().join("b"), "x.png", 8, 8);
        write_png(input.path(), "top.png", 8, 8);

        let job = ResizeJob::new(settings(input.path(), output.path(), 2), &Config::default())
            .unwrap();
        let outcome = job.run().unwrap();

        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].output, output.path().join("top.png.png"));
    }

    #[test]
    fn test_prepare_rejects_missing_input_and_creates_output() {
        let dir = tempfile::tempdir().unwrap();
        let missing = settings(&dir.path().join("nope"), &dir.path().join("out"), 1);
        assert!(missing.prepare().is_err());

        let good = settings(dir.path(), &dir.path().join("out/nested"), 1);
        good.prepare().unwrap();
        assert!(dir.path().join("out/nested").is_dir());
    }

    #[test]
    fn test_prepare_rejects_zero_threads() {
        let dir = tempfile::tempdir().unwrap();
        let err = settings(dir.path(), dir.path(), 0).prepare().unwrap_err();
        assert!(err.to_string().contains("threads"));
    }
}
