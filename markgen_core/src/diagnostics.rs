//! Run-wide diagnostics.
//!
//! Every message goes through a [`NamedLogger`], which forwards it to
//! `tracing` and records warnings and errors in the shared [`Diagnostics`]
//! sink. Any error flips the run-wide `has_errors` flag, which the
//! orchestrator checks at each phase boundary.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub logger: String,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.logger, self.severity, self.message)
    }
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    has_errors: AtomicBool,
    errors: AtomicUsize,
    warnings: AtomicUsize,
    records: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors.load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    /// Warnings and errors recorded so far, in arrival order.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    pub fn logger(self: &Arc<Self>, name: impl Into<String>) -> NamedLogger {
        NamedLogger {
            name: Arc::from(name.into()),
            sink: Arc::clone(self),
        }
    }

    pub fn record(&self, logger: &str, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => debug!(logger, "{}", message),
            Severity::Info => info!(logger, "{}", message),
            Severity::Warning => {
                warn!(logger, "{}", message);
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            Severity::Error => {
                error!(logger, "{}", message);
                self.errors.fetch_add(1, Ordering::Relaxed);
                self.has_errors.store(true, Ordering::Release);
            }
        }

        if severity >= Severity::Warning {
            self.records.lock().push(Diagnostic {
                logger: logger.to_string(),
                severity,
                message,
            });
        }
    }
}

/// A logger bound to one component (the orchestrator, a plugin, a project).
#[derive(Debug, Clone)]
pub struct NamedLogger {
    name: Arc<str>,
    sink: Arc<Diagnostics>,
}

impl NamedLogger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.sink
    }

    pub fn child(&self, suffix: &str) -> NamedLogger {
        self.sink.logger(format!("{}/{}", self.name, suffix))
    }

    pub fn error(&self, message: impl Into<String>) {
        self.sink.record(&self.name, Severity::Error, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.sink.record(&self.name, Severity::Warning, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.sink.record(&self.name, Severity::Info, message);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.sink.record(&self.name, Severity::Debug, message);
    }

    pub fn has_errors(&self) -> bool {
        self.sink.has_errors()
    }

    /// Runs `f` and logs how long it took at debug level.
    pub fn measure<T>(&self, label: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let result = f();
        debug!(logger = %self.name, "{} took {:?}", label, started.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // ==================== Severity Tests ====================

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Debug);
    }

    // ==================== Diagnostics Tests ====================

    #[test]
    fn test_warnings_do_not_set_error_flag() {
        let diagnostics = Diagnostics::new();
        let logger = diagnostics.logger("flags");
        logger.warning("duplicate file name");
        logger.info("done");

        assert!(!diagnostics.has_errors());
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[test]
    fn test_error_sets_flag() {
        let diagnostics = Diagnostics::new();
        diagnostics.logger("commands").error("no parser for Vec2");

        assert!(diagnostics.has_errors());
        assert_eq!(
            diagnostics.snapshot(),
            vec![Diagnostic {
                logger: "commands".to_string(),
                severity: Severity::Error,
                message: "no parser for Vec2".to_string(),
            }]
        );
    }

    #[test]
    fn test_info_and_debug_are_not_recorded() {
        let diagnostics = Diagnostics::new();
        let logger = diagnostics.logger("root");
        logger.info("hello");
        logger.debug("details");
        assert!(diagnostics.snapshot().is_empty());
    }

    #[test]
    fn test_child_logger_name() {
        let diagnostics = Diagnostics::new();
        let child = diagnostics.logger("parsers").child("game::ui");
        assert_eq!(child.name(), "parsers/game::ui");
    }

    #[test]
    fn test_measure_returns_value() {
        let diagnostics = Diagnostics::new();
        let logger = diagnostics.logger("timing");
        assert_eq!(logger.measure("sum", || 2 + 2), 4);
    }
}
