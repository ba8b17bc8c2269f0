//! Downstream collaborators: the clock and the record sink.
//!
//! The dispatcher never reaches for process-wide state; both are injected
//! when it is built.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// One decoded event.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct EmitError(pub String);

impl EmitError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<std::io::Error> for EmitError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

/// Source of the current time, in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Accepts decoded records for routing downstream.
pub trait EmitSink: Send + Sync {
    fn emit(&self, tag: &str, time: i64, record: Record) -> Result<(), EmitError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Writes one JSON line per record to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl EmitSink for StdoutSink {
    fn emit(&self, tag: &str, time: i64, record: Record) -> Result<(), EmitError> {
        let line = serde_json::json!({
            "tag": tag,
            "time": time,
            "record": record,
        });
        let mut out = std::io::stdout().lock();
        serde_json::to_writer(&mut out, &line).map_err(|e| EmitError::new(e.to_string()))?;
        out.write_all(b"\n")?;
        Ok(())
    }
}
