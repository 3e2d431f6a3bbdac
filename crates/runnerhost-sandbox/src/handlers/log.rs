//! Logging channel: guest log lines land in the host's `tracing` output.

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

/// Levels a guest may name. Anything else is logged at `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestLevel {
    Trace,
    Debug,
    Info,
    Log,
    Warn,
    Error,
}

impl GuestLevel {
    pub fn parse(level: Option<&str>) -> Self {
        match level.map(str::to_ascii_uppercase).as_deref() {
            Some("TRACE") => Self::Trace,
            Some("DEBUG") => Self::Debug,
            Some("LOG") => Self::Log,
            Some("WARN") | Some("WARNING") => Self::Warn,
            Some("ERROR") => Self::Error,
            _ => Self::Info,
        }
    }
}

/// Handle `{level, message, context}` from `runner`.
pub fn handle(runner: &str, payload: &Value) {
    let level = GuestLevel::parse(payload.get("level").and_then(Value::as_str));
    let message = match payload.get("message") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let context = payload
        .get("context")
        .filter(|c| !c.is_null())
        .map(Value::to_string)
        .unwrap_or_default();

    match level {
        GuestLevel::Trace => trace!(target: "runner", runner, context = %context, "{message}"),
        GuestLevel::Debug => debug!(target: "runner", runner, context = %context, "{message}"),
        GuestLevel::Info | GuestLevel::Log => info!(target: "runner", runner, context = %context, "{message}"),
        GuestLevel::Warn => warn!(target: "runner", runner, context = %context, "{message}"),
        GuestLevel::Error => error!(target: "runner", runner, context = %context, "{message}"),
    }
}
