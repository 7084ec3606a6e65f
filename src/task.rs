//! File transform tasks.
//!
//! A [`Task`] is the leaf unit of the build graph: it collects every file
//! matching a glob pattern, pushes each one through an ordered list of
//! [`Stage`]s, and writes the results under the output directory while
//! preserving the path structure relative to the base directory. Tasks own
//! no mutable state; every invocation is independent.

use std::fs;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use camino::{Utf8Path, Utf8PathBuf};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::error::{TaskError, TransformError};

/// A single file moving through a task, addressed relative to the task's
/// base directory. Stages may rewrite both the contents and the path (for
/// example to change the extension).
#[derive(Debug, Clone, PartialEq)]
pub struct FileUnit {
    pub path: Utf8PathBuf,
    pub contents: Vec<u8>,
}

/// One external transform applied per file.
///
/// Each collaborator (stylesheet compiler, script compiler, template
/// renderer, image optimizer) is a separate implementation picked by static
/// composition. A failing stage short-circuits the remaining stages for
/// that file.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, file: FileUnit) -> Result<FileUnit, TransformError>;
}

/// Channel end used to tell the live-reload layer which files changed.
/// Only identities travel over it, never contents.
pub type ReloadTx = Sender<Vec<Utf8PathBuf>>;

pub struct Task {
    name: &'static str,
    pattern: String,
    base: Utf8PathBuf,
    cwd: Utf8PathBuf,
    out: Utf8PathBuf,
    stages: Vec<Arc<dyn Stage>>,
    reload: Option<ReloadTx>,
}

impl Task {
    /// Create a task reading `pattern` under `cwd`, writing to `out` with
    /// paths kept relative to `base`. No stages yet, so files pass through
    /// verbatim.
    pub fn new(
        name: &'static str,
        pattern: impl Into<String>,
        base: impl AsRef<Utf8Path>,
        cwd: impl AsRef<Utf8Path>,
        out: impl AsRef<Utf8Path>,
    ) -> Self {
        Self {
            name,
            pattern: pattern.into(),
            base: base.as_ref().to_owned(),
            cwd: cwd.as_ref().to_owned(),
            out: out.as_ref().to_owned(),
            stages: Vec::new(),
            reload: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn with_reload(mut self, tx: ReloadTx) -> Self {
        self.reload = Some(tx);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run the task to completion: collect, transform, write, notify.
    ///
    /// An empty glob is a successful no-op. Any per-file failure fails the
    /// whole task; files are processed in parallel and no failure is ever
    /// dropped.
    pub fn run(&self) -> Result<(), TaskError> {
        let files = self.collect()?;
        if files.is_empty() {
            tracing::debug!(task = self.name, "no files matched");
            return Ok(());
        }

        let bar = ProgressBar::new(files.len() as u64).with_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Error setting progress bar template")
                .progress_chars("#>-"),
        );
        bar.set_message(self.name);

        let written = files
            .par_iter()
            .map(|path| {
                let result = self.process(path);
                bar.inc(1);
                result
            })
            .collect::<Result<Vec<_>, TaskError>>();
        bar.finish_and_clear();
        let written = written?;

        tracing::info!(task = self.name, files = written.len(), "finished");

        if let Some(tx) = &self.reload {
            // The receiver is gone once the dev server shuts down.
            if tx.send(written).is_err() {
                tracing::debug!(task = self.name, "reload channel closed");
            }
        }

        Ok(())
    }

    fn collect(&self) -> Result<Vec<Utf8PathBuf>, TaskError> {
        let pattern = self.cwd.join(&self.pattern);
        let mut found = Vec::new();

        for entry in glob::glob(pattern.as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if path.is_file() {
                found.push(path);
            }
        }

        found.sort();
        Ok(found)
    }

    fn process(&self, path: &Utf8Path) -> Result<Utf8PathBuf, TaskError> {
        let contents = fs::read(path)?;
        let rel = path.strip_prefix(&self.base).unwrap_or(path).to_owned();

        let mut unit = FileUnit {
            path: rel,
            contents,
        };
        for stage in &self.stages {
            unit = stage.apply(unit).map_err(|source| TaskError::Transform {
                file: path.to_owned(),
                source,
            })?;
        }

        let target = self.out.join(&unit.path);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&target, &unit.contents)?;

        Ok(unit.path)
    }
}
