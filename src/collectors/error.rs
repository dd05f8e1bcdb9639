use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollectError {
    #[error("{tool} is not available on this host")]
    ToolUnavailable { tool: String },
    #[error("{tool} did not finish within {after:?}")]
    Timeout { tool: String, after: Duration },
    #[error("no {0} data found")]
    NoData(&'static str),
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("failed to launch {tool}: {reason}")]
    Spawn { tool: String, reason: String },
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("{capability} collection failed: {reason}")]
    Fault {
        capability: &'static str,
        reason: String,
    },
}

impl CollectError {
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
