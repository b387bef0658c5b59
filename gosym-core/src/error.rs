//! Error types for gosym operations

use std::path::PathBuf;
use std::time::Duration;

/// Coarse classification used for logging and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// An external tool invocation failed; degrades one unit of work.
    Execution,
    /// Malformed tool output or cache file.
    Parse,
    /// Snapshot rejected on schema or toolchain mismatch; triggers a rebuild.
    Validation,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum GoSymError {
    #[error("Command `{command}` failed (exit {}): {stderr}", .status.map(|s| s.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Execution {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Schema version mismatch: snapshot is v{found}, expected v{expected}")]
    SchemaVersionMismatch { found: u32, expected: u32 },

    #[error("Toolchain version mismatch: snapshot built with {found}, current is {expected}")]
    ToolchainMismatch { found: String, expected: String },

    #[error("Toolchain version unknown (is the go binary on PATH?)")]
    ToolchainUnknown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("A refresh is already in progress")]
    RefreshInProgress,
}

impl GoSymError {
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Execution { .. } | Self::Spawn { .. } | Self::Timeout { .. } => {
                ErrorCategory::Execution
            }
            Self::Parse { .. } | Self::Serialization(_) => ErrorCategory::Parse,
            Self::SchemaVersionMismatch { .. }
            | Self::ToolchainMismatch { .. }
            | Self::ToolchainUnknown => ErrorCategory::Validation,
            _ => ErrorCategory::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let exec = GoSymError::Execution {
            command: "go list -m all".to_string(),
            status: Some(1),
            stderr: "boom".to_string(),
        };
        assert_eq!(exec.category(), ErrorCategory::Execution);
        assert_eq!(
            GoSymError::parse("go doc", "bad line").category(),
            ErrorCategory::Parse
        );
        assert_eq!(
            GoSymError::SchemaVersionMismatch {
                found: 999,
                expected: 1
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(GoSymError::RefreshInProgress.category(), ErrorCategory::Other);
    }

    #[test]
    fn test_execution_message_includes_stderr() {
        let err = GoSymError::Execution {
            command: "go list -m foo".to_string(),
            status: Some(1),
            stderr: "not a known dependency".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("go list -m foo"));
        assert!(msg.contains("exit 1"));
        assert!(msg.contains("not a known dependency"));
    }
}
