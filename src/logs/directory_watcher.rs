//! Directory watching
//!
//! Lifecycle: `Idle` → `InitialScan` (every existing matching file is
//! processed in full) → `Watching` (filesystem notifications re-run the file
//! processor on the changed file) → `Stopped` once shutdown is signalled.
//!
//! Notifications arrive on the `notify` backend thread and are forwarded to
//! the watch task through a tokio channel; file processing itself runs on the
//! blocking pool.

use super::file_processor::FileProcessor;
use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

/// Watcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    InitialScan,
    Watching,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatcherState::Idle => "idle",
            WatcherState::InitialScan => "initial-scan",
            WatcherState::Watching => "watching",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of the startup scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub files_processed: usize,
    pub files_failed: usize,
    pub records_emitted: usize,
}

/// Watches one directory for changes to log files
pub struct DirectoryWatcher {
    dir: PathBuf,
    extension: String,
    processor: FileProcessor,
    state: Arc<RwLock<WatcherState>>,
}

impl DirectoryWatcher {
    /// Watch `dir` for files ending in `.{extension}`
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        processor: FileProcessor,
    ) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            processor,
            state: Arc::new(RwLock::new(WatcherState::Idle)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> WatcherState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the initial scan, then spawn the watch loop.
    ///
    /// Fails only when the directory cannot be created or watched. The
    /// returned task ends once `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>> {
        if self.state() != WatcherState::Idle {
            return Err(anyhow::anyhow!(
                "Watcher for {} is already {}",
                self.dir.display(),
                self.state()
            ));
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create log directory {}", self.dir.display()))?;
        info!("Starting log processing, monitoring directory: {}", self.dir.display());

        let summary = self.initial_scan()?;
        info!(
            "Initial scan processed {} files ({} failed), {} records",
            summary.files_processed, summary.files_failed, summary.records_emitted
        );

        let (tx, rx) = mpsc::channel(1024);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                // Receiver gone means the loop has already stopped
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )
        .context("Failed to create filesystem watcher")?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory {}", self.dir.display()))?;

        self.set_state(WatcherState::Watching);

        let task = WatchTask {
            watcher,
            events: rx,
            shutdown,
            extension: self.extension.clone(),
            processor: self.processor.clone(),
            state: self.state.clone(),
        };
        Ok(tokio::spawn(task.run()))
    }

    /// Process every matching file currently in the directory
    pub fn initial_scan(&self) -> Result<ScanSummary> {
        self.set_state(WatcherState::InitialScan);

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry
                .with_context(|| format!("Failed to list directory {}", self.dir.display()))?;
            if entry.file_type().is_file() && has_extension(entry.path(), &self.extension) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        let mut summary = ScanSummary::default();
        for path in files {
            match self.processor.process_file(&path) {
                Ok(result) => {
                    summary.files_processed += 1;
                    summary.records_emitted += result.records_emitted;
                }
                Err(e) => {
                    error!("Error processing file {}: {:#}", path.display(), e);
                    summary.files_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    fn set_state(&self, state: WatcherState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Everything the spawned loop owns
struct WatchTask {
    // Dropping the watcher stops notifications
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<Result<Event, notify::Error>>,
    shutdown: watch::Receiver<bool>,
    extension: String,
    processor: FileProcessor,
    state: Arc<RwLock<WatcherState>>,
}

impl WatchTask {
    #[instrument(skip_all)]
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(Ok(event)) => handle_event(&self.processor, &self.extension, event).await,
                    Some(Err(e)) => warn!("Watch error: {}", e),
                    None => {
                        warn!("Filesystem event channel closed");
                        break;
                    }
                },

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("Received shutdown signal, stopping directory watcher");
                        break;
                    }
                }
            }
        }

        drop(self.watcher);
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = WatcherState::Stopped;
    }
}

async fn handle_event(processor: &FileProcessor, extension: &str, event: Event) {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return;
    }

    for path in event.paths {
        if !has_extension(&path, extension) {
            continue;
        }

        debug!("Change detected: {}", path.display());
        let processor = processor.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || processor.process_file(&target)).await {
            Ok(Ok(summary)) => {
                if summary.records_emitted > 0 {
                    info!(
                        "Processed {} new lines from {}",
                        summary.records_emitted,
                        path.display()
                    );
                }
            }
            Ok(Err(e)) => error!("Error processing file {}: {:#}", path.display(), e),
            Err(e) => error!("File processing task for {} failed: {}", path.display(), e),
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(extension)
}
