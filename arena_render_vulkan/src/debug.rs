//! Validation layer messages
//!
//! The messenger callback counts every message per severity, groups
//! repeats, and forwards the text to the backend logger under
//! `arena::vulkan::validation`.

use arena_render::{engine_debug, engine_error, engine_trace, engine_warn};
use colored::*;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

#[cfg(feature = "vulkan-validation")]
use ash::vk;
#[cfg(feature = "vulkan-validation")]
use std::ffi::CStr;

/// Process-wide counters, the callback has no other place to write to
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Validation messages received since the messenger was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Lowest severity forwarded by the messenger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ValidationSeverity {
    Verbose,
    Info,
    #[default]
    Warning,
    Error,
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn increment(&self, severity: ValidationSeverity) {
        let counter = match severity {
            ValidationSeverity::Error => &self.errors,
            ValidationSeverity::Warning => &self.warnings,
            ValidationSeverity::Info => &self.info,
            ValidationSeverity::Verbose => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Clear counters and repeat tracking; called when a messenger is created
pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(FxHashMap::default());
    }
}

pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Count a message and return how many times this exact text was seen
#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
fn track_message(severity: ValidationSeverity, message: &str) -> u32 {
    VALIDATION_STATS.increment(severity);
    let Ok(mut guard) = MESSAGE_TRACKER.lock() else {
        return 1;
    };
    let count = guard
        .get_or_insert_with(FxHashMap::default)
        .entry(message.to_string())
        .or_insert(0);
    *count += 1;
    *count
}

/// Repeats beyond the first few are counted but not logged again
const MAX_REPEATS_LOGGED: u32 = 3;

#[cfg_attr(not(feature = "vulkan-validation"), allow(dead_code))]
fn forward_message(severity: ValidationSeverity, kind: &str, id: &str, message: &str) {
    let occurrence = track_message(severity, message);
    if occurrence > MAX_REPEATS_LOGGED {
        return;
    }
    let repeat = if occurrence > 1 { format!(" [x{}]", occurrence) } else { String::new() };
    match severity {
        ValidationSeverity::Error => {
            engine_error!("arena::vulkan::validation", "[{}] {}{}: {}", kind, id, repeat, message)
        }
        ValidationSeverity::Warning => {
            engine_warn!("arena::vulkan::validation", "[{}] {}{}: {}", kind, id, repeat, message)
        }
        ValidationSeverity::Info => {
            engine_debug!("arena::vulkan::validation", "[{}] {}{}: {}", kind, id, repeat, message)
        }
        ValidationSeverity::Verbose => {
            engine_trace!("arena::vulkan::validation", "[{}] {}{}: {}", kind, id, repeat, message)
        }
    }
}

/// Summary of everything the validation layers reported
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());
    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }
    println!("  {} {}", "Total:".white().bold(), stats.total());

    if let Ok(guard) = MESSAGE_TRACKER.lock() {
        if let Some(tracker) = guard.as_ref() {
            let repeated = tracker.values().filter(|&&count| count > 1).count();
            if repeated > 0 {
                println!("\n  {} message(s) appeared multiple times", repeated);
            }
        }
    }
    println!("{}\n", "====================================".bright_blue().bold());
}

#[cfg(feature = "vulkan-validation")]
pub fn severity_flags(min: ValidationSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    match min {
        ValidationSeverity::Error => S::ERROR,
        ValidationSeverity::Warning => S::ERROR | S::WARNING,
        ValidationSeverity::Info => S::ERROR | S::WARNING | S::INFO,
        ValidationSeverity::Verbose => S::ERROR | S::WARNING | S::INFO | S::VERBOSE,
    }
}

#[cfg(feature = "vulkan-validation")]
fn severity_from_vk(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> ValidationSeverity {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if flags.contains(S::ERROR) {
        ValidationSeverity::Error
    } else if flags.contains(S::WARNING) {
        ValidationSeverity::Warning
    } else if flags.contains(S::INFO) {
        ValidationSeverity::Info
    } else {
        ValidationSeverity::Verbose
    }
}

/// Debug messenger callback installed when validation is enabled
///
/// # Safety
///
/// Called by the Vulkan loader with a valid callback data pointer.
#[cfg(feature = "vulkan-validation")]
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let id = if callback_data.p_message_id_name.is_null() {
        "Unknown".into()
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        "No message".into()
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    let kind = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    forward_message(severity_from_vk(message_severity), kind, &id, &message);
    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
