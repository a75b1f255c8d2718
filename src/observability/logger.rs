//! Structured JSON logger
//!
//! - One JSON object per line, `event` first, then `severity`
//! - Remaining fields sorted by key
//! - Synchronous, no buffering
//! - ERROR on stderr, everything else on stdout
//!
//! Secrets never go through here; callers pass names and hosts only.

use std::fmt;
use std::io::{self, Write};

use serde_json::Value;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    Warn,
    /// The run stops; also goes to stderr
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-lines logger for installer progress
///
/// Errors go to stderr so they survive a redirected progress stream.
pub struct Logger;

impl Logger {
    /// Log `event` at `severity`; fields come out sorted by key.
    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        let line = Self::render(severity, event, fields);
        // Logging never fails the caller.
        if severity >= Severity::Error {
            let _ = io::stderr().lock().write_all(line.as_bytes());
        } else {
            let mut out = io::stdout().lock();
            let _ = out.write_all(line.as_bytes());
            let _ = out.flush();
        }
    }

    /// One log line, newline included
    pub(crate) fn render(severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
        let mut sorted: Vec<_> = fields.to_vec();
        sorted.sort_by_key(|(key, _)| *key);

        let mut line = format!(
            "{{\"event\":{},\"severity\":\"{}\"",
            Value::from(event),
            severity
        );
        for (key, value) in sorted {
            line.push_str(&format!(",{}:{}", Value::from(key), Value::from(value)));
        }
        line.push_str("}\n");
        line
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!(Severity::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_line_is_json() {
        let line = Logger::render(
            Severity::Info,
            "COMMIT_STEP_BEGIN",
            &[("step", "directory"), ("mode", "bundle")],
        );

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "COMMIT_STEP_BEGIN");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["step"], "directory");
        assert_eq!(parsed["mode"], "bundle");
    }

    #[test]
    fn test_field_order_is_stable() {
        let a = Logger::render(Severity::Warn, "DNS_MISMATCH", &[("host", "h"), ("addr", "a")]);
        let b = Logger::render(Severity::Warn, "DNS_MISMATCH", &[("addr", "a"), ("host", "h")]);
        assert_eq!(a, b);
        assert!(a.starts_with("{\"event\":\"DNS_MISMATCH\",\"severity\":\"WARN\""));
        assert!(a.find("\"addr\"").unwrap() < a.find("\"host\"").unwrap());
    }

    #[test]
    fn test_remediation_text_stays_on_one_line() {
        let reason = "agreement exists\nipa-replica-manage del \"r\" --force";
        let line = Logger::render(Severity::Error, "PREFLIGHT_FAILED", &[("reason", reason)]);

        assert_eq!(line.matches('\n').count(), 1);
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["reason"], reason);
    }
}
