//! Parallel processing of many input files.
//!
//! Each [`FileTask`] runs read, process and write on one worker. A failing or
//! panicking task yields an error outcome for its own file only; every other
//! task still runs to completion.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::config::RunConfig;
use crate::error::PipelineError;
use crate::input::read_ivt_file;
use crate::output::{write_outputs, OutputPaths};
use crate::pipeline::process_batch;

/// One input file and where its results go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

impl FileTask {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Base name for the output files.
    pub fn stem(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }
}

/// What a successful task produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub threshold: f64,
    pub candidates: usize,
    pub tracks: usize,
    pub outputs: OutputPaths,
}

/// Result of one task, reported in queue order.
#[derive(Debug)]
pub struct FileOutcome {
    pub task: FileTask,
    pub result: Result<FileSummary, PipelineError>,
}

impl FileOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Read, process and write one file.
pub fn run_file(task: &FileTask, config: &RunConfig) -> Result<FileSummary, PipelineError> {
    let batch = read_ivt_file(&task.input)?.restrict(&config.domain)?;
    let output = process_batch(&batch, config)?;
    std::fs::create_dir_all(&task.output_dir).map_err(|e| PipelineError::io(&task.output_dir, e))?;
    let outputs = write_outputs(&task.output_dir, &task.stem(), &output)?;
    Ok(FileSummary {
        threshold: output.threshold,
        candidates: output.candidates.len(),
        tracks: output.tracks.len(),
        outputs,
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Drives a queue of file tasks through a dedicated thread pool.
#[derive(Debug, Clone)]
pub struct BatchRunner<'a> {
    config: &'a RunConfig,
    threads: Option<usize>,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            threads: None,
        }
    }

    /// Limit the pool to `threads` workers; rayon picks when unset or zero.
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads.filter(|&n| n > 0);
        self
    }

    /// One task per input, all writing into `output_dir`.
    pub fn tasks(inputs: &[PathBuf], output_dir: &Path) -> Vec<FileTask> {
        inputs
            .iter()
            .map(|input| FileTask::new(input.clone(), output_dir))
            .collect()
    }

    /// Run every task; outcomes come back in the order of `tasks`.
    ///
    /// Only a pool construction failure is an error here. Per-file failures
    /// are reported in the outcomes.
    pub fn run(&self, tasks: Vec<FileTask>) -> Result<Vec<FileOutcome>, PipelineError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = self.threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        log::info!(
            "processing {} file(s) on {} thread(s)",
            tasks.len(),
            pool.current_num_threads()
        );
        let config = self.config;
        let outcomes: Vec<FileOutcome> = pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| {
                    let result = catch_unwind(AssertUnwindSafe(|| run_file(&task, config)))
                        .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))));
                    match &result {
                        Ok(summary) => log::info!(
                            "{}: {} candidate(s), {} track(s)",
                            task.input.display(),
                            summary.candidates,
                            summary.tracks
                        ),
                        Err(e) => log::error!("{}: {}", task.input.display(), e),
                    }
                    FileOutcome { task, result }
                })
                .collect()
        });

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        log::info!("{} of {} file(s) succeeded", outcomes.len() - failed, outcomes.len());
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem() {
        assert_eq!(FileTask::new("/data/era5_2000.json", "/out").stem(), "era5_2000");
        assert_eq!(FileTask::new("/", "/out").stem(), "output");
    }

    #[test]
    fn test_panic_message() {
        let payload = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload), "boom");
        let payload = catch_unwind(|| panic!("{} {}", "formatted", 1)).unwrap_err();
        assert_eq!(panic_message(payload), "formatted 1");
    }

    #[test]
    fn test_zero_threads_means_default() {
        let config = RunConfig::default();
        let runner = BatchRunner::new(&config).with_threads(Some(0));
        assert!(runner.threads.is_none());
        assert!(runner.run(Vec::new()).unwrap().is_empty());
    }
}
