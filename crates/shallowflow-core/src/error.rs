use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShallowFlowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A script raised inside the interpreter. `trace` is the formatted traceback.
    #[error("Script error: {}", last_line(trace))]
    Script { trace: String },

    #[error("Install error: {0}")]
    Install(String),

    #[error("Fetch error: {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("{0} cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ShallowFlowError>;

impl ShallowFlowError {
    pub fn script(trace: impl Into<String>) -> Self {
        Self::Script {
            trace: trace.into(),
        }
    }

    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// The line shown to users when a script fails during setup.
    ///
    /// Formatted tracebacks end with the exception line followed by a
    /// trailing newline, so the second-to-last line of the split text is
    /// the exception itself. Non-script errors use their display form.
    pub fn summary_line(&self) -> String {
        match self {
            Self::Script { trace } => trace_summary(trace).to_string(),
            other => other.to_string(),
        }
    }
}

/// Second-to-last line of `trace` split on `\n`, or the whole text when it
/// has a single line.
pub fn trace_summary(trace: &str) -> &str {
    let lines: Vec<&str> = trace.split('\n').collect();
    if lines.len() < 2 {
        return trace;
    }
    lines[lines.len() - 2]
}

fn last_line(trace: &str) -> &str {
    trace
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or(trace)
}
