//! Gated logging for the caption engine.
//!
//! Lines go through a [`Logger`], which drops them unless logging is enabled
//! and the line's level is at or below the configured level, then hands them
//! to a [`LogSink`]. Hosts decide where lines end up; [`TracingSink`] forwards
//! them to `tracing`.
//!
//! | level | name      | used for                         |
//! |-------|-----------|----------------------------------|
//! | 0     | error     | failures, retry bail-out         |
//! | 1     | warn      | suspicious input                 |
//! | 2     | log       | passes, option changes           |
//! | 3     | trace     | per-document captions            |
//! | 4     | variables | every variable substitution      |

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Verbosity of a log line. Lower is more important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Log = 2,
    Trace = 3,
    Variables = 4,
}

impl LogLevel {
    pub const MAX: u8 = LogLevel::Variables as u8;

    /// Maps a numeric level, clamping anything above [`LogLevel::MAX`].
    pub fn from_u8(level: u8) -> Self {
        match level {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Log,
            3 => LogLevel::Trace,
            _ => LogLevel::Variables,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Log => "log",
            LogLevel::Trace => "trace",
            LogLevel::Variables => "variables",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for log lines that passed the gate. Fire-and-forget.
pub trait LogSink: Send + Sync {
    fn output(&self, level: LogLevel, line: &str);
}

/// Forwards lines to `tracing` under the `tabcaption` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn output(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: "tabcaption", "{line}"),
            LogLevel::Warn => tracing::warn!(target: "tabcaption", "{line}"),
            LogLevel::Log => tracing::info!(target: "tabcaption", "{line}"),
            LogLevel::Trace => tracing::debug!(target: "tabcaption", "{line}"),
            LogLevel::Variables => tracing::trace!(target: "tabcaption", "{line}"),
        }
    }
}

/// Keeps every line in memory. Useful for hosts that show a log pane and
/// for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, line)| line.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn output(&self, level: LogLevel, line: &str) {
        self.lines.lock().push((level, line.to_string()));
    }
}

struct LoggerShared {
    enabled: AtomicBool,
    level: AtomicU8,
    sink: Arc<dyn LogSink>,
}

/// Gated, optionally prefixed logger. Clones share the gate and the sink.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<LoggerShared>,
    prefix: Option<Cow<'static, str>>,
}

impl Logger {
    pub fn new(sink: Arc<dyn LogSink>, enabled: bool, level: u8) -> Self {
        Self {
            shared: Arc::new(LoggerShared {
                enabled: AtomicBool::new(enabled),
                level: AtomicU8::new(level.min(LogLevel::MAX)),
                sink,
            }),
            prefix: None,
        }
    }

    /// Logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(Arc::new(TracingSink), false, 0)
    }

    /// Returns a logger sharing this one's gate and sink, with every line
    /// prefixed by `prefix: `.
    pub fn scoped(&self, prefix: impl Into<Cow<'static, str>>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            prefix: Some(prefix.into()),
        }
    }

    pub fn configure(&self, enabled: bool, level: u8) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
        self.shared
            .level
            .store(level.min(LogLevel::MAX), Ordering::Relaxed);
    }

    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.shared.enabled.load(Ordering::Relaxed)
            && level as u8 <= self.shared.level.load(Ordering::Relaxed)
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.write(LogLevel::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.write(LogLevel::Warn, args);
    }

    pub fn log(&self, args: fmt::Arguments<'_>) {
        self.write(LogLevel::Log, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.write(LogLevel::Trace, args);
    }

    pub fn variables(&self, args: fmt::Arguments<'_>) {
        self.write(LogLevel::Variables, args);
    }

    /// Bypasses the gate; used to confirm that logging was just enabled.
    pub fn always(&self, args: fmt::Arguments<'_>) {
        self.emit(LogLevel::Log, args);
    }

    fn write(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if self.is_enabled(level) {
            self.emit(level, args);
        }
    }

    fn emit(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        let line = match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}: {args}"),
            _ => args.to_string(),
        };
        self.shared.sink.output(level, &line);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("enabled", &self.shared.enabled.load(Ordering::Relaxed))
            .field("level", &self.shared.level.load(Ordering::Relaxed))
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger(enabled: bool, level: u8) -> (Logger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Logger::new(sink.clone(), enabled, level), sink)
    }

    #[test]
    fn disabled_logger_drops_everything_but_always() {
        let (logger, sink) = logger(false, 4);
        logger.error(format_args!("nope"));
        logger.always(format_args!("logging enabled"));
        assert_eq!(sink.lines(), vec!["logging enabled".to_string()]);
    }

    #[test]
    fn level_gate_filters_verbose_lines() {
        let (logger, sink) = logger(true, 2);
        logger.error(format_args!("e"));
        logger.warn(format_args!("w"));
        logger.log(format_args!("l"));
        logger.trace(format_args!("t"));
        logger.variables(format_args!("v"));
        assert_eq!(sink.lines(), vec!["e", "w", "l"]);
    }

    #[test]
    fn scoped_loggers_share_gate_and_prefix_lines() {
        let (logger, sink) = logger(false, 2);
        let scoped = logger.scoped("sync");
        scoped.log(format_args!("hidden"));

        logger.configure(true, 3);
        scoped.trace(format_args!("caption is {}", "x"));
        assert_eq!(sink.lines(), vec!["sync: caption is x"]);
    }

    #[test]
    fn level_is_clamped() {
        let (logger, _) = logger(true, 200);
        assert!(logger.is_enabled(LogLevel::Variables));
        assert_eq!(LogLevel::from_u8(9), LogLevel::Variables);
    }
}
