//! Agent mode implementation
//!
//! Wires the pipeline together: builds the shared dedup set, sink and
//! statistics, starts the directory watcher and the stats server, and waits
//! for Ctrl+C or an explicit shutdown request.

use crate::config::WatchConfig;
use crate::logs::{
    DirectoryWatcher, FileProcessor, JsonLinesStore, LineDeduplicator, LogStats, RecordSink,
    TracingSink, WatcherState,
};
use crate::server;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Long-running log ingestion service
pub struct Agent {
    config: WatchConfig,
    stats: Arc<LogStats>,
    dedup: Arc<LineDeduplicator>,
    sink: Arc<dyn RecordSink>,
    watcher: DirectoryWatcher,
    shutdown_tx: watch::Sender<bool>,
}

impl Agent {
    /// Build the agent; records go to `config.output` or, if unset, only to the log
    pub fn new(config: WatchConfig) -> Result<Self> {
        let sink: Arc<dyn RecordSink> = match &config.output {
            Some(path) => Arc::new(JsonLinesStore::new(path)?),
            None => Arc::new(TracingSink::new()),
        };
        Self::with_sink(config, sink)
    }

    /// Build the agent around an existing sink
    pub fn with_sink(config: WatchConfig, sink: Arc<dyn RecordSink>) -> Result<Self> {
        config.validate().context("Invalid watch configuration")?;

        let stats = Arc::new(LogStats::new()?);
        let dedup = Arc::new(LineDeduplicator::new(config.dedup_capacity));
        let processor = FileProcessor::new(dedup.clone(), sink.clone(), stats.clone());
        let watcher = DirectoryWatcher::new(
            config.log_dir.clone(),
            config.file_extension.clone(),
            processor,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            stats,
            dedup,
            sink,
            watcher,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<LogStats> {
        self.stats.clone()
    }

    pub fn sink(&self) -> Arc<dyn RecordSink> {
        self.sink.clone()
    }

    pub fn watcher_state(&self) -> WatcherState {
        self.watcher.state()
    }

    /// Number of line hashes currently remembered
    pub fn dedup_len(&self) -> usize {
        self.dedup.len()
    }

    /// Handle that stops [`Agent::run`] when `true` is sent through it
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    /// Run until Ctrl+C or a shutdown request.
    ///
    /// Failing to bind the stats port or to create or watch the log directory
    /// aborts startup; nothing after that point is fatal.
    #[instrument(skip(self), fields(log_dir = %self.config.log_dir.display()))]
    pub async fn run(&self) -> Result<()> {
        let server_handle = self.start_server().await?;

        let watcher_handle = match self.watcher.start(self.shutdown_tx.subscribe()).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = self.shutdown_tx.send(true);
                if let Some(handle) = server_handle {
                    let _ = handle.await;
                }
                return Err(e);
            }
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
            }
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                info!("Shutdown requested");
            }
        }

        // Graceful shutdown
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = watcher_handle.await {
            error!("Directory watcher task failed: {}", e);
        }
        if let Some(handle) = server_handle {
            match handle.await {
                Ok(Err(e)) => warn!("Stats server stopped with error: {:#}", e),
                Err(e) => error!("Stats server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }

        let snapshot = self.stats.snapshot();
        info!(
            "Stopped: {} records parsed, {} unknown",
            snapshot.success_count, snapshot.failure_count
        );
        Ok(())
    }

    async fn start_server(&self) -> Result<Option<JoinHandle<Result<()>>>> {
        if !self.config.server_enabled {
            return Ok(None);
        }

        let listener = server::bind(self.config.stats_port).await?;
        info!(
            "Stats available at http://0.0.0.0:{}/stats and /metrics",
            self.config.stats_port
        );
        Ok(Some(tokio::spawn(server::serve(
            self.stats.clone(),
            listener,
            self.shutdown_tx.subscribe(),
        ))))
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::SAMPLE_LINES;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> WatchConfig {
        WatchConfig {
            log_dir: dir.to_path_buf(),
            server_enabled: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_agent_creation() {
        let temp_dir = tempdir().unwrap();
        let agent = Agent::new(test_config(temp_dir.path())).unwrap();
        assert_eq!(agent.watcher_state(), WatcherState::Idle);
        assert_eq!(agent.dedup_len(), 0);
        assert_eq!(agent.stats().snapshot().success_count, 0);
        assert_eq!(agent.sink().sink_type(), "tracing");
    }

    #[test]
    fn test_agent_output_selects_file_sink() {
        let temp_dir = tempdir().unwrap();
        let config = WatchConfig {
            output: Some(temp_dir.path().join("records.jsonl")),
            ..test_config(temp_dir.path())
        };
        let agent = Agent::new(config).unwrap();
        assert_eq!(agent.sink().sink_type(), "jsonl");
    }

    #[test]
    fn test_agent_rejects_invalid_config() {
        let temp_dir = tempdir().unwrap();
        let config = WatchConfig {
            dedup_capacity: 0,
            ..test_config(temp_dir.path())
        };
        assert!(Agent::new(config).is_err());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("app.log"), SAMPLE_LINES.join("\n")).unwrap();

        let agent = Arc::new(Agent::new(test_config(temp_dir.path())).unwrap());
        let shutdown = agent.shutdown_handle();

        let runner = agent.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        for _ in 0..100 {
            if agent.watcher_state() == WatcherState::Watching {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(agent.stats().snapshot().success_count, 4);
        assert_eq!(agent.dedup_len(), 4);

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(agent.watcher_state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn test_run_fails_when_directory_unusable() {
        let temp_dir = tempdir().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        fs::write(&blocker, "file").unwrap();

        let agent = Agent::new(test_config(&blocker.join("logs"))).unwrap();
        assert!(agent.run().await.is_err());
    }

    #[tokio::test]
    async fn test_run_fails_when_stats_port_taken() {
        let temp_dir = tempdir().unwrap();
        let taken = server::bind(0).await.unwrap();
        let config = WatchConfig {
            server_enabled: true,
            stats_port: taken.local_addr().unwrap().port(),
            ..test_config(temp_dir.path())
        };

        let agent = Agent::new(config).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), agent.run())
            .await
            .unwrap();
        assert!(result.is_err());
        // Startup stopped before the watcher ran
        assert_eq!(agent.watcher_state(), WatcherState::Idle);
    }
}
