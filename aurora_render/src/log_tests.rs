//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity, DefaultLogger and FilteredLogger.

use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, FilteredLogger};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

fn entry(severity: LogSeverity, message: &str) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "aurora::test".to_string(),
        message: message.to_string(),
        file: None,
        line: None,
    }
}

struct CaptureLogger {
    messages: Arc<Mutex<Vec<String>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.messages.lock().unwrap().push(entry.message.clone());
    }
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trace < LogSeverity::Debug);
    assert!(LogSeverity::Debug < LogSeverity::Info);
    assert!(LogSeverity::Info < LogSeverity::Warn);
    assert!(LogSeverity::Warn < LogSeverity::Error);
}

#[test]
fn test_log_severity_labels_are_fixed_width() {
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        assert_eq!(severity.label().len(), 5);
    }
}

// ============================================================================
// LOG ENTRY / DEFAULT LOGGER TESTS
// ============================================================================

#[test]
fn test_format_plain_without_location() {
    let e = entry(LogSeverity::Info, "Backend switched to Vulkan");
    let text = DefaultLogger::format_plain(&e);
    assert!(text.contains("[INFO ]"));
    assert!(text.contains("[aurora::test]"));
    assert!(text.ends_with("Backend switched to Vulkan"));
}

#[test]
fn test_format_plain_with_location() {
    let mut e = entry(LogSeverity::Error, "vkCreateDevice failed");
    e.file = Some("vulkan_backend.rs");
    e.line = Some(42);
    let text = DefaultLogger::format_plain(&e);
    assert!(text.ends_with("vkCreateDevice failed (vulkan_backend.rs:42)"));
}

#[test]
fn test_default_logger_all_severities() {
    let logger = DefaultLogger;
    for severity in [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ] {
        // Just verify it doesn't panic
        logger.log(&entry(severity, "message"));
    }
}

// ============================================================================
// FILTERED LOGGER TESTS
// ============================================================================

#[test]
fn test_filtered_logger_drops_below_threshold() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let logger = FilteredLogger::new(
        CaptureLogger { messages: messages.clone() },
        LogSeverity::Warn,
    );

    logger.log(&entry(LogSeverity::Trace, "trace"));
    logger.log(&entry(LogSeverity::Info, "info"));
    logger.log(&entry(LogSeverity::Warn, "warn"));
    logger.log(&entry(LogSeverity::Error, "error"));

    let captured = messages.lock().unwrap();
    assert_eq!(*captured, vec!["warn".to_string(), "error".to_string()]);
}
