//! Unit tests for log.rs
//!
//! Tests LogSeverity, LogEntry, DefaultLogger, the logger slot and the
//! error-producing macros. Tests touching the global logger are #[serial].

use crate::log::{self, DefaultLogger, LogEntry, LogSeverity, Logger};
use crate::Error;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Test logger that captures entries for verification
#[derive(Clone)]
struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    fn new() -> Self {
        Self { entries: Arc::new(Mutex::new(Vec::new())) }
    }

    fn take(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap())
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
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
fn test_log_severity_debug() {
    assert_eq!(format!("{:?}", LogSeverity::Trace), "Trace");
    assert_eq!(format!("{:?}", LogSeverity::Error), "Error");
}

// ============================================================================
// LOG ENTRY / DEFAULT LOGGER
// ============================================================================

#[test]
fn test_log_entry_with_file_line() {
    let entry = LogEntry {
        severity: LogSeverity::Error,
        timestamp: SystemTime::now(),
        source: "arena::vulkan".to_string(),
        message: "vkCreateGraphicsPipelines failed".to_string(),
        file: Some("vulkan_pipeline.rs"),
        line: Some(42),
    };
    let copy = entry.clone();
    assert_eq!(copy.severity, LogSeverity::Error);
    assert_eq!(copy.source, "arena::vulkan");
    assert_eq!(copy.file, Some("vulkan_pipeline.rs"));
    assert_eq!(copy.line, Some(42));
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
        logger.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: "arena::test".to_string(),
            message: "message".to_string(),
            file: None,
            line: None,
        });
    }
    logger.log(&LogEntry {
        severity: LogSeverity::Error,
        timestamp: SystemTime::now(),
        source: "arena::test".to_string(),
        message: "detailed".to_string(),
        file: Some("log_tests.rs"),
        line: Some(1),
    });
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<DefaultLogger>();
    assert_send_sync::<Box<dyn Logger>>();
}

// ============================================================================
// LOGGER SLOT AND MACROS
// ============================================================================

#[test]
#[serial]
fn test_set_logger_routes_macros() {
    let capture = CaptureLogger::new();
    log::set_logger(capture.clone());

    crate::engine_info!("arena::test", "value {}", 7);
    crate::engine_warn!("arena::test", "careful");
    crate::engine_error!("arena::test", "broken");

    let entries = capture.take();
    log::reset_logger();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].severity, LogSeverity::Info);
    assert_eq!(entries[0].message, "value 7");
    assert!(entries[0].file.is_none());
    assert_eq!(entries[2].severity, LogSeverity::Error);
    assert!(entries[2].file.is_some());
    assert!(entries[2].line.is_some());
}

#[test]
#[serial]
fn test_engine_err_logs_and_builds_error() {
    let capture = CaptureLogger::new();
    log::set_logger(capture.clone());

    let err = crate::engine_err!("arena::test", "compile failed: {}", "VK_ERROR_UNKNOWN");

    let entries = capture.take();
    log::reset_logger();

    assert_eq!(err, Error::BackendError("compile failed: VK_ERROR_UNKNOWN".to_string()));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, "arena::test");
}

#[test]
#[serial]
fn test_engine_bail_returns_early() {
    fn fails(flag: bool) -> crate::Result<u32> {
        if flag {
            crate::engine_bail!("arena::test", "bailing with {}", 3);
        }
        Ok(1)
    }

    let capture = CaptureLogger::new();
    log::set_logger(capture.clone());
    assert_eq!(fails(false), Ok(1));
    assert_eq!(fails(true), Err(Error::BackendError("bailing with 3".to_string())));
    let entries = capture.take();
    log::reset_logger();
    assert_eq!(entries.len(), 1);
}

#[test]
#[serial]
fn test_reset_logger_detaches_custom_logger() {
    let capture = CaptureLogger::new();
    log::set_logger(capture.clone());
    log::reset_logger();
    crate::engine_debug!("arena::test", "goes to the default logger");
    assert!(capture.take().is_empty());
}
