//! Running statistics over emitted records
//!
//! Counters are shared between the watcher task and the HTTP handlers, so
//! totals are atomics and tallies sit behind `RwLock`s. The same counts are
//! mirrored into a Prometheus registry for the `/metrics` endpoint.

use super::{LogFormat, ParsedRecord};
use anyhow::{Context, Result};
use prometheus::{IntCounterVec, Opts, Registry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Point-in-time copy of the statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub success_count: u64,
    pub failure_count: u64,
    pub status_code_counts: BTreeMap<i32, u64>,
    pub source_ip_counts: BTreeMap<String, u64>,
}

/// Aggregated counters for every record handed to the stats collaborator
pub struct LogStats {
    success_count: AtomicU64,
    failure_count: AtomicU64,
    status_code_counts: RwLock<HashMap<i32, u64>>,
    source_ip_counts: RwLock<HashMap<String, u64>>,
    registry: Registry,
    records_total: IntCounterVec,
    status_codes_total: IntCounterVec,
}

impl LogStats {
    /// Create empty statistics with a fresh Prometheus registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Create empty statistics, registering counters in `registry`
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let records_total = IntCounterVec::new(
            Opts::new("logsift_records_total", "Parsed records by outcome"),
            &["outcome"],
        )
        .context("Failed to create records counter")?;
        let status_codes_total = IntCounterVec::new(
            Opts::new("logsift_status_codes_total", "Parsed records by HTTP status code"),
            &["code"],
        )
        .context("Failed to create status code counter")?;

        registry
            .register(Box::new(records_total.clone()))
            .context("Failed to register records counter")?;
        registry
            .register(Box::new(status_codes_total.clone()))
            .context("Failed to register status code counter")?;

        Ok(Self {
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            status_code_counts: RwLock::new(HashMap::new()),
            source_ip_counts: RwLock::new(HashMap::new()),
            registry,
            records_total,
            status_codes_total,
        })
    }

    /// Account for one record
    pub fn update(&self, record: &ParsedRecord) {
        if record.log_format == LogFormat::Unknown {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            self.records_total.with_label_values(&["failure"]).inc();
        } else {
            self.success_count.fetch_add(1, Ordering::Relaxed);
            self.records_total.with_label_values(&["success"]).inc();
        }

        if let Some(code) = record.status_code {
            *self
                .status_code_counts
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(code)
                .or_insert(0) += 1;
            self.status_codes_total
                .with_label_values(&[code.to_string().as_str()])
                .inc();
        }

        if let Some(ip) = &record.source_ip {
            *self
                .source_ip_counts
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(ip.clone())
                .or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let status_code_counts = self
            .status_code_counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(code, count)| (*code, *count))
            .collect();
        let source_ip_counts = self
            .source_ip_counts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(ip, count)| (ip.clone(), *count))
            .collect();

        StatsSnapshot {
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            status_code_counts,
            source_ip_counts,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
