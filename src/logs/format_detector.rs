//! Format detection
//!
//! Classifies a raw line by running a fixed sequence of checks; the first
//! check that matches decides the format. The order is json, apache, nginx,
//! syslog. The nginx prefix also accepts apache lines, so apache must be
//! tried first.

use super::LogFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::IgnoredAny;

static APACHE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\S+ - - \[[0-9]+/[A-Za-z0-9_]+/[0-9]+:[0-9]+:[0-9]+:[0-9]+ [+-][0-9]+\]")
        .expect("apache prefix pattern is valid")
});

static NGINX_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\S+ - \S+ \[[0-9]+/[A-Za-z0-9_]+/[0-9]+:[0-9]+:[0-9]+:[0-9]+ [+-][0-9]+\]")
        .expect("nginx prefix pattern is valid")
});

static SYSLOG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<[0-9]+>[0-9]+ [0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}")
        .expect("syslog prefix pattern is valid")
});

/// Classify a single log line
pub fn detect(line: &str) -> LogFormat {
    if is_json(line) {
        LogFormat::Json
    } else if APACHE_PREFIX.is_match(line) {
        LogFormat::Apache
    } else if NGINX_PREFIX.is_match(line) {
        LogFormat::Nginx
    } else if SYSLOG_PREFIX.is_match(line) {
        LogFormat::Syslog
    } else {
        LogFormat::Unknown
    }
}

// Any JSON value counts, not only objects.
fn is_json(line: &str) -> bool {
    serde_json::from_str::<IgnoredAny>(line).is_ok()
}
