//! Record sinks
//!
//! Destinations for parsed records. A sink takes ownership of each record,
//! assigns it an identifier and stores it.
//!
//! - `TracingSink`: keeps nothing, only logs each record; the service default
//! - `MemoryStore`: keeps every record, for tests and embedding
//! - `JsonLinesStore`: appends records to a file

use super::ParsedRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Trait for record persistence
pub trait RecordSink: Send + Sync {
    /// Store a record and return the identifier assigned to it
    fn save(&self, record: ParsedRecord) -> Result<Uuid>;

    /// Short name of the sink kind
    fn sink_type(&self) -> &'static str;
}

/// A record together with the identifier its sink assigned
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: ParsedRecord,
}

impl StoredRecord {
    fn assign(record: ParsedRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            record,
        }
    }
}

/// Sink that retains nothing and reports each record through `tracing`
#[derive(Debug, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for TracingSink {
    fn save(&self, record: ParsedRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        debug!("Record {} ({}) from {}", id, record.log_format, record.source_file);
        Ok(id)
    }

    fn sink_type(&self) -> &'static str {
        "tracing"
    }
}

/// In-memory store, kept in insertion order. Grows without bound.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything stored so far
    pub fn records(&self) -> Vec<StoredRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordSink for MemoryStore {
    fn save(&self, record: ParsedRecord) -> Result<Uuid> {
        let stored = StoredRecord::assign(record);
        let id = stored.id;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stored);
        Ok(id)
    }

    fn sink_type(&self) -> &'static str {
        "memory"
    }
}

/// Appends each record as one JSON line to a file
pub struct JsonLinesStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesStore {
    /// Open (or create) `path` for appending, creating parent directories
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create output directory {}", parent.display())
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open output file {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonLinesStore {
    fn save(&self, record: ParsedRecord) -> Result<Uuid> {
        let stored = StoredRecord::assign(record);
        let mut line =
            serde_json::to_string(&stored).context("Failed to serialize record to JSON")?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to write to file: {}", self.path.display()))?;

        Ok(stored.id)
    }

    fn sink_type(&self) -> &'static str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{parse, SAMPLE_LINES};
    use tempfile::tempdir;

    #[test]
    fn test_tracing_sink_retains_nothing() {
        let sink = TracingSink::new();
        let first = sink.save(parse(SAMPLE_LINES[0], "a.log")).unwrap();
        let second = sink.save(parse(SAMPLE_LINES[0], "a.log")).unwrap();
        assert_ne!(first, second);
        assert_eq!(sink.sink_type(), "tracing");
    }

    #[test]
    fn test_memory_store_assigns_unique_ids() {
        let store = MemoryStore::new();
        let first = store.save(parse(SAMPLE_LINES[0], "a.log")).unwrap();
        let second = store.save(parse(SAMPLE_LINES[0], "a.log")).unwrap();

        assert_ne!(first, second);
        assert_eq!(store.len(), 2);

        let records = store.records();
        assert_eq!(records[0].id, first);
        assert_eq!(records[1].id, second);
    }

    #[test]
    fn test_json_lines_store_appends() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("out").join("records.jsonl");

        let store = JsonLinesStore::new(&path).unwrap();
        let id = store.save(parse(SAMPLE_LINES[3], "sys.log")).unwrap();
        store.save(parse("not a log line", "sys.log")).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], id.to_string());
        assert_eq!(first["logFormat"], "syslog");
        assert_eq!(first["sourceIp"], "myhost");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["logFormat"], "unknown");
    }

    #[test]
    fn test_json_lines_store_reopens_for_append() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("records.jsonl");

        JsonLinesStore::new(&path)
            .unwrap()
            .save(parse(SAMPLE_LINES[0], "a.log"))
            .unwrap();
        JsonLinesStore::new(&path)
            .unwrap()
            .save(parse(SAMPLE_LINES[1], "a.log"))
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
