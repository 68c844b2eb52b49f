//! Unit tests for the validation message tracking
//!
//! The counters are process-wide, so every test is #[serial].

use super::*;
use arena_render::arena::log::{reset_logger, set_logger, LogEntry, LogSeverity, Logger};
use serial_test::serial;
use std::sync::Arc;

// ============================================================================
// TEST HELPERS
// ============================================================================

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
// STATS
// ============================================================================

#[test]
#[serial]
fn test_counts_per_severity() {
    reset_validation_stats();
    let capture = CaptureLogger::new();
    set_logger(capture.clone());

    forward_message(ValidationSeverity::Error, "Validation", "VUID-1", "bad layout");
    forward_message(ValidationSeverity::Warning, "Performance", "perf", "slow path");
    forward_message(ValidationSeverity::Verbose, "General", "loader", "layer found");

    let stats = get_validation_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.info, 0);
    assert_eq!(stats.verbose, 1);
    assert_eq!(stats.total(), 3);

    let entries = capture.take();
    reset_logger();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].severity, LogSeverity::Error);
    assert_eq!(entries[0].source, "arena::vulkan::validation");
    assert!(entries[0].message.contains("VUID-1"));
    assert_eq!(entries[1].severity, LogSeverity::Warn);
    assert_eq!(entries[2].severity, LogSeverity::Trace);
}

#[test]
#[serial]
fn test_repeats_counted_but_logged_a_few_times() {
    reset_validation_stats();
    let capture = CaptureLogger::new();
    set_logger(capture.clone());

    for _ in 0..10 {
        forward_message(ValidationSeverity::Warning, "Validation", "VUID-2", "same text");
    }

    let entries = capture.take();
    reset_logger();
    assert_eq!(get_validation_stats().warnings, 10);
    assert_eq!(entries.len(), MAX_REPEATS_LOGGED as usize);
    assert!(entries[1].message.contains("[x2]"));
}

#[test]
#[serial]
fn test_reset_clears_counters() {
    forward_message(ValidationSeverity::Info, "General", "id", "message");
    reset_validation_stats();
    assert_eq!(get_validation_stats(), ValidationStats::default());
}

#[test]
fn test_severity_order() {
    assert!(ValidationSeverity::Verbose < ValidationSeverity::Info);
    assert!(ValidationSeverity::Warning < ValidationSeverity::Error);
    assert_eq!(ValidationSeverity::default(), ValidationSeverity::Warning);
}

#[cfg(feature = "vulkan-validation")]
#[test]
fn test_severity_flags_include_everything_above_minimum() {
    use ash::vk::DebugUtilsMessageSeverityFlagsEXT as S;
    assert_eq!(severity_flags(ValidationSeverity::Error), S::ERROR);
    assert_eq!(severity_flags(ValidationSeverity::Warning), S::ERROR | S::WARNING);
    assert!(severity_flags(ValidationSeverity::Verbose).contains(S::VERBOSE | S::INFO));
    assert_eq!(severity_from_vk(S::WARNING), ValidationSeverity::Warning);
}
