//! logsift - Log ingestion agent
//!
//! Watches a directory of log files, classifies every new line as JSON,
//! Apache, Nginx or syslog, extracts a structured record from it and hands the
//! record to a sink while keeping running statistics.

pub mod agent;
pub mod config;
pub mod logs;
pub mod server;
