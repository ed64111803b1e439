//! Field extractors
//!
//! One extractor per detected format. Each one matches the whole line against
//! a fixed pattern and fills the typed slots of a [`ParsedRecord`]; extras that
//! have no typed slot go into [`AdditionalFields`](super::AdditionalFields).
//!
//! A line that was detected as some format but does not match that format's
//! full pattern is not an error: the record keeps its format tag and its
//! optional fields stay empty. Errors are reserved for values that match the
//! pattern but cannot be converted (for example a status code that overflows),
//! and are turned into an `unknown` record by [`parse`](super::parse).
//!
//! # Examples
//!
//! ```rust
//! use logsift::logs::{extract, LogFormat};
//!
//! let line = r#"<34>1 2023-07-28T10:27:10Z myhost myapp 1234 ID47 [id@1 a="b"] hello"#;
//! let record = extract(line, LogFormat::Syslog, "syslog.log").unwrap();
//! assert_eq!(record.source_ip.as_deref(), Some("myhost"));
//! assert_eq!(record.additional_fields.get("message"), Some("hello"));
//! ```

use super::timestamp::normalize;
use super::{LogFormat, ParsedRecord};
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static APACHE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<host>\S+) - - \[(?P<date>[0-9]+/[A-Za-z0-9_]+/[0-9]+):(?P<time>[0-9]+:[0-9]+:[0-9]+) (?P<offset>[+-][0-9]+)\] "(?P<method>\S+) (?P<path>\S+) (?P<protocol>[^"]+)" (?P<status>[0-9]+) (?P<size>[0-9]+|-)$"#,
    )
    .expect("apache line pattern is valid")
});

static NGINX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<host>\S+) - (?P<user>\S+) \[(?P<date>[0-9]+/[A-Za-z0-9_]+/[0-9]+):(?P<time>[0-9]+:[0-9]+:[0-9]+) (?P<offset>[+-][0-9]+)\] "(?P<method>\S+) (?P<path>\S+) (?P<protocol>[^"]+)" (?P<status>[0-9]+) (?P<size>[0-9]+) "(?P<referrer>[^"]*)" "(?P<user_agent>[^"]*)"$"#,
    )
    .expect("nginx line pattern is valid")
});

// <priority>version timestamp hostname app-name procid msgid [structured-data] message
static SYSLOG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^<(?P<priority>[0-9]+)>[0-9]+ (?P<timestamp>[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}[^ ]*) (?P<hostname>\S+) (?P<app_name>\S+) (?P<proc_id>\S+) (?P<msg_id>\S+) \[(?P<structured_data>[^\]]*)\] (?P<message>.*)$",
    )
    .expect("syslog line pattern is valid")
});

/// Trait for per-format field extraction
pub trait FieldExtractor: Send + Sync {
    /// Fill `record` with the fields found in `line`
    fn extract(&self, line: &str, record: &mut ParsedRecord) -> Result<()>;

    /// Format this extractor handles
    fn format(&self) -> LogFormat;
}

/// Apache combined log format without an authenticated user
pub struct ApacheExtractor;

impl FieldExtractor for ApacheExtractor {
    fn extract(&self, line: &str, record: &mut ParsedRecord) -> Result<()> {
        let Some(caps) = APACHE_LINE.captures(line) else {
            return Ok(());
        };

        fill_request_fields(&caps, record)?;

        let size = &caps["size"];
        record.size_bytes = Some(if size == "-" {
            0
        } else {
            size.parse::<i64>()
                .with_context(|| format!("Invalid response size: {}", size))?
        });

        Ok(())
    }

    fn format(&self) -> LogFormat {
        LogFormat::Apache
    }
}

/// Nginx access log with user, referrer and user agent
pub struct NginxExtractor;

impl FieldExtractor for NginxExtractor {
    fn extract(&self, line: &str, record: &mut ParsedRecord) -> Result<()> {
        let Some(caps) = NGINX_LINE.captures(line) else {
            return Ok(());
        };

        fill_request_fields(&caps, record)?;

        let size = &caps["size"];
        record.size_bytes = Some(
            size.parse::<i64>()
                .with_context(|| format!("Invalid response size: {}", size))?,
        );

        let extras = &mut record.additional_fields;
        extras.insert_opt("user", dash_as_none(&caps["user"]));
        extras.insert_opt("referrer", dash_as_none(&caps["referrer"]));
        extras.insert("userAgent", &caps["user_agent"]);

        Ok(())
    }

    fn format(&self) -> LogFormat {
        LogFormat::Nginx
    }
}

/// JSON object logs
pub struct JsonExtractor;

impl FieldExtractor for JsonExtractor {
    fn extract(&self, line: &str, record: &mut ParsedRecord) -> Result<()> {
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse JSON: {}", line))?;

        // Scalars and arrays carry no fields
        let Value::Object(map) = value else {
            return Ok(());
        };

        record.timestamp = map.get("timestamp").and_then(text_value);
        record.source_ip = map
            .get("ip")
            .and_then(text_value)
            .or_else(|| map.get("source_ip").and_then(text_value));

        for (key, val) in &map {
            record.additional_fields.insert(key.clone(), coerce_to_string(val));
        }

        Ok(())
    }

    fn format(&self) -> LogFormat {
        LogFormat::Json
    }
}

/// RFC 5424 style syslog
pub struct SyslogExtractor;

impl FieldExtractor for SyslogExtractor {
    fn extract(&self, line: &str, record: &mut ParsedRecord) -> Result<()> {
        let Some(caps) = SYSLOG_LINE.captures(line) else {
            return Ok(());
        };

        record.timestamp = Some(caps["timestamp"].to_string());
        // Hostname stands in for the source address
        record.source_ip = Some(caps["hostname"].to_string());

        let extras = &mut record.additional_fields;
        extras.insert("priority", &caps["priority"]);
        extras.insert("appName", &caps["app_name"]);
        extras.insert("procId", &caps["proc_id"]);
        extras.insert("msgId", &caps["msg_id"]);
        extras.insert("structuredData", &caps["structured_data"]);
        extras.insert("message", &caps["message"]);

        Ok(())
    }

    fn format(&self) -> LogFormat {
        LogFormat::Syslog
    }
}

/// Extractor for a detected format, `None` for [`LogFormat::Unknown`]
pub fn extractor_for(format: LogFormat) -> Option<&'static dyn FieldExtractor> {
    match format {
        LogFormat::Apache => Some(&ApacheExtractor),
        LogFormat::Nginx => Some(&NginxExtractor),
        LogFormat::Json => Some(&JsonExtractor),
        LogFormat::Syslog => Some(&SyslogExtractor),
        LogFormat::Unknown => None,
    }
}

/// Build a record for `line`, already classified as `format`
pub fn extract(line: &str, format: LogFormat, source_file: &str) -> Result<ParsedRecord> {
    let mut record = ParsedRecord::new(line, source_file, format);
    if let Some(extractor) = extractor_for(format) {
        extractor.extract(line, &mut record)?;
    }
    Ok(record)
}

/// Fields shared by the two access-log grammars
fn fill_request_fields(caps: &Captures<'_>, record: &mut ParsedRecord) -> Result<()> {
    let status = &caps["status"];
    record.status_code = Some(
        status
            .parse::<i32>()
            .with_context(|| format!("Invalid status code: {}", status))?,
    );
    record.source_ip = Some(caps["host"].to_string());
    record.timestamp = Some(normalize(&caps["date"], &caps["time"], &caps["offset"])?);
    record.method = Some(caps["method"].to_string());
    record.path = Some(caps["path"].to_string());
    Ok(())
}

fn dash_as_none(value: &str) -> Option<String> {
    if value == "-" {
        None
    } else {
        Some(value.to_string())
    }
}

/// Text of a value, treating JSON null as missing
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(coerce_to_string(other)),
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
