//! File processing
//!
//! Reads a log file from the beginning, skips lines whose hash is already in
//! the dedup set, and hands every new line's record to the sink and the stats.
//! There is no offset tracking: re-running on an unchanged file emits nothing
//! because every line is already marked seen.

use super::dedup::{hash_line, LineDeduplicator};
use super::record_sink::RecordSink;
use super::stats::LogStats;
use super::parse;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Characters of a record shown in debug output
const PREVIEW_CHARS: usize = 100;

/// Counts from one pass over a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub lines_read: usize,
    pub records_emitted: usize,
    pub duplicates_skipped: usize,
}

/// Pushes unseen lines of a file through the parser
#[derive(Clone)]
pub struct FileProcessor {
    dedup: Arc<LineDeduplicator>,
    sink: Arc<dyn RecordSink>,
    stats: Arc<LogStats>,
}

impl FileProcessor {
    pub fn new(
        dedup: Arc<LineDeduplicator>,
        sink: Arc<dyn RecordSink>,
        stats: Arc<LogStats>,
    ) -> Self {
        Self { dedup, sink, stats }
    }

    /// Process the entire current content of `path`
    pub fn process_file(&self, path: &Path) -> Result<ProcessSummary> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let source_file = path.to_string_lossy();

        let mut summary = ProcessSummary::default();
        let mut buffer = Vec::new();

        while let Some(line) = read_line_lossy(&mut reader, &mut buffer)
            .with_context(|| format!("Failed to read log file {}", path.display()))?
        {
            summary.lines_read += 1;

            if self.process_line(&line, &source_file) {
                summary.records_emitted += 1;
            } else {
                summary.duplicates_skipped += 1;
            }
        }

        debug!(
            "Processed {}: {} lines, {} new, {} already seen",
            path.display(),
            summary.lines_read,
            summary.records_emitted,
            summary.duplicates_skipped
        );

        Ok(summary)
    }

    /// Handle one raw line; returns false when it was already seen
    pub fn process_line(&self, line: &str, source_file: &str) -> bool {
        let hash = hash_line(line);
        if self.dedup.seen(hash) {
            return false;
        }

        let record = parse(line.trim(), source_file);
        debug!("Parsed log from {}: {}", source_file, record.preview(PREVIEW_CHARS));

        self.stats.update(&record);
        if let Err(e) = self.sink.save(record) {
            warn!("Failed to store record from {}: {:#}", source_file, e);
        }

        self.dedup.mark_seen(hash);
        true
    }
}

/// Read the next line without its line ending, replacing invalid UTF-8.
///
/// Returns `None` at end of input. `buffer` is scratch space reused between calls.
pub fn read_line_lossy<R: BufRead>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    buffer.clear();
    if reader.read_until(b'\n', buffer)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(strip_line_ending(buffer)).into_owned()))
}

fn strip_line_ending(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::record_sink::{MemoryStore, StoredRecord};
    use crate::logs::{LogFormat, ParsedRecord, SAMPLE_LINES};
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        stats: Arc<LogStats>,
        dedup: Arc<LineDeduplicator>,
        processor: FileProcessor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let stats = Arc::new(LogStats::new().unwrap());
        let dedup = Arc::new(LineDeduplicator::default());
        let processor = FileProcessor::new(dedup.clone(), store.clone(), stats.clone());
        Fixture {
            store,
            stats,
            dedup,
            processor,
        }
    }

    struct FailingSink;

    impl RecordSink for FailingSink {
        fn save(&self, _record: ParsedRecord) -> Result<Uuid> {
            Err(anyhow::anyhow!("disk full"))
        }

        fn sink_type(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_process_file_emits_each_line() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, SAMPLE_LINES.join("\n")).unwrap();

        let fx = fixture();
        let summary = fx.processor.process_file(&path).unwrap();

        assert_eq!(summary.lines_read, 4);
        assert_eq!(summary.records_emitted, 4);
        assert_eq!(fx.store.len(), 4);
        assert_eq!(fx.dedup.len(), 4);

        let records: Vec<StoredRecord> = fx.store.records();
        assert_eq!(records[0].record.log_format, LogFormat::Apache);
        assert_eq!(records[3].record.log_format, LogFormat::Syslog);
        assert_eq!(records[0].record.source_file, path.to_string_lossy());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, format!("{}\n{}\n", SAMPLE_LINES[0], SAMPLE_LINES[1])).unwrap();

        let fx = fixture();
        fx.processor.process_file(&path).unwrap();
        let summary = fx.processor.process_file(&path).unwrap();

        assert_eq!(summary.records_emitted, 0);
        assert_eq!(summary.duplicates_skipped, 2);
        assert_eq!(fx.store.len(), 2);
        assert_eq!(fx.stats.snapshot().success_count, 2);
    }

    #[test]
    fn test_appended_lines_only() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("app.log");
        fs::write(&path, format!("{}\n", SAMPLE_LINES[0])).unwrap();

        let fx = fixture();
        fx.processor.process_file(&path).unwrap();

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", SAMPLE_LINES[3]).unwrap();
        drop(file);

        let summary = fx.processor.process_file(&path).unwrap();
        assert_eq!(summary.records_emitted, 1);

        let records = fx.store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].record.log_format, LogFormat::Syslog);
    }

    #[test]
    fn test_lines_are_trimmed_and_crlf_stripped() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("win.log");
        fs::write(&path, format!("   {}  \r\n", SAMPLE_LINES[0])).unwrap();

        let fx = fixture();
        fx.processor.process_file(&path).unwrap();

        let records = fx.store.records();
        assert_eq!(records[0].record.raw_line, SAMPLE_LINES[0]);
        assert_eq!(records[0].record.log_format, LogFormat::Apache);
    }

    #[test]
    fn test_duplicate_lines_within_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("dup.log");
        fs::write(&path, "same line\nsame line\nother line\n").unwrap();

        let fx = fixture();
        let summary = fx.processor.process_file(&path).unwrap();

        assert_eq!(summary.records_emitted, 2);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(fx.stats.snapshot().failure_count, 2);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bin.log");
        fs::write(&path, b"ok line\n\xff\xfe broken\n").unwrap();

        let fx = fixture();
        let summary = fx.processor.process_file(&path).unwrap();
        assert_eq!(summary.records_emitted, 2);
    }

    #[test]
    fn test_read_line_lossy() {
        let mut reader = io::Cursor::new(b"first\r\nsec\xffond\nlast".to_vec());
        let mut buffer = Vec::new();

        let lines: Vec<String> =
            std::iter::from_fn(|| read_line_lossy(&mut reader, &mut buffer).unwrap()).collect();
        assert_eq!(lines, vec!["first", "sec\u{FFFD}ond", "last"]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let temp_dir = tempdir().unwrap();
        let fx = fixture();
        let result = fx.processor.process_file(&temp_dir.path().join("missing.log"));
        assert!(result.is_err());
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_sink_failure_still_marks_seen() {
        let stats = Arc::new(LogStats::new().unwrap());
        let dedup = Arc::new(LineDeduplicator::default());
        let processor = FileProcessor::new(dedup.clone(), Arc::new(FailingSink), stats.clone());

        assert!(processor.process_line(SAMPLE_LINES[0], "a.log"));
        assert!(!processor.process_line(SAMPLE_LINES[0], "a.log"));
        assert_eq!(stats.snapshot().success_count, 1);
    }
}
