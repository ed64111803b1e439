//! Log ingestion core
//!
//! This module holds the record model and the pipeline that turns raw log lines
//! into [`ParsedRecord`]s:
//!
//! - `format_detector`: ordered heuristic classification of a line
//! - `log_parsers`: per-format field extraction
//! - `timestamp`: access-log timestamp normalization
//! - `dedup`: bounded set of already-processed line hashes
//! - `file_processor`: reads a file and pushes unseen lines through the parser
//! - `directory_watcher`: initial scan plus filesystem notifications
//! - `record_sink` / `stats`: the collaborators records are handed to
//!
//! # Examples
//!
//! ```rust
//! use logsift::logs::{parse, LogFormat};
//!
//! let line = r#"192.168.1.20 - - [28/Jul/2023:10:27:10 +0000] "GET /index.html HTTP/1.1" 200 2326"#;
//! let record = parse(line, "access.log");
//! assert_eq!(record.log_format, LogFormat::Apache);
//! assert_eq!(record.status_code, Some(200));
//! ```

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub mod dedup;
pub mod directory_watcher;
pub mod file_processor;
pub mod format_detector;
pub mod log_parsers;
pub mod record_sink;
pub mod stats;
pub mod timestamp;

pub use dedup::{hash_line, LineDeduplicator, DEFAULT_DEDUP_CAPACITY};
pub use directory_watcher::{DirectoryWatcher, ScanSummary, WatcherState};
pub use file_processor::{read_line_lossy, FileProcessor, ProcessSummary};
pub use format_detector::detect;
pub use log_parsers::extract;
pub use record_sink::{JsonLinesStore, MemoryStore, RecordSink, StoredRecord, TracingSink};
pub use stats::{LogStats, StatsSnapshot};
pub use timestamp::normalize;

/// Sample lines, one per supported format
pub const SAMPLE_LINES: [&str; 4] = [
    r#"192.168.1.20 - - [28/Jul/2023:10:27:10 +0000] "GET /index.html HTTP/1.1" 200 2326"#,
    r#"192.168.1.10 - john [28/Jul/2023:10:27:10 +0000] "GET /api/users HTTP/1.1" 404 52 "https://example.com" "Mozilla/5.0""#,
    r#"{"timestamp": "2023-07-28T10:27:10Z", "level": "ERROR", "message": "Database connection failed", "service": "user-api"}"#,
    r#"<34>1 2023-07-28T10:27:10Z myhost myapp 1234 ID47 [example@1234 foo="bar"] This is a syslog message"#,
];

/// Grammar a line was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Any syntactically valid JSON document
    Json,
    /// Combined log format without an authenticated user
    Apache,
    /// Combined log format with a user field, referrer and user agent
    Nginx,
    /// RFC 5424 style syslog
    Syslog,
    /// Nothing matched, or extraction failed
    Unknown,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Apache => "apache",
            LogFormat::Nginx => "nginx",
            LogFormat::Syslog => "syslog",
            LogFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format-specific extras that have no typed slot on the record.
///
/// Serialized as a single opaque JSON string so that consumers can store it
/// in one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdditionalFields(BTreeMap<String, String>);

impl AdditionalFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Insert only when a value is present
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<String>) {
        if let Some(value) = value {
            self.0.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Render the map as a JSON object string
    pub fn to_blob(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

fn serialize_fields_as_blob<S>(fields: &AdditionalFields, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if fields.is_empty() {
        serializer.serialize_none()
    } else {
        serializer.serialize_str(&fields.to_blob())
    }
}

/// Structured result of parsing one log line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedRecord {
    pub timestamp: Option<String>,
    pub source_ip: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<i32>,
    pub size_bytes: Option<i64>,
    pub log_format: LogFormat,
    pub raw_line: String,
    pub source_file: String,
    #[serde(serialize_with = "serialize_fields_as_blob")]
    pub additional_fields: AdditionalFields,
}

impl ParsedRecord {
    /// Create a record carrying only the raw line, its origin and a format tag
    pub fn new(raw_line: &str, source_file: &str, log_format: LogFormat) -> Self {
        Self {
            timestamp: None,
            source_ip: None,
            method: None,
            path: None,
            status_code: None,
            size_bytes: None,
            log_format,
            raw_line: raw_line.to_string(),
            source_file: source_file.to_string(),
            additional_fields: AdditionalFields::new(),
        }
    }

    /// Short single-line rendering used in log output
    pub fn preview(&self, max_chars: usize) -> String {
        let rendered = serde_json::to_string(self).unwrap_or_else(|_| self.raw_line.clone());
        if rendered.chars().count() > max_chars {
            let truncated: String = rendered.chars().take(max_chars).collect();
            format!("{}...", truncated)
        } else {
            rendered
        }
    }
}

/// Detect the format of `line` and extract its fields.
///
/// Never fails: an extraction error downgrades the record to
/// [`LogFormat::Unknown`] and drops whatever was partially extracted.
pub fn parse(line: &str, source_file: &str) -> ParsedRecord {
    let format = detect(line);
    match extract(line, format, source_file) {
        Ok(record) => record,
        Err(e) => {
            debug!("Extraction as {} failed for line from {}: {:#}", format, source_file, e);
            ParsedRecord::new(line, source_file, LogFormat::Unknown)
        }
    }
}
