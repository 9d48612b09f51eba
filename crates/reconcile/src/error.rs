//! Error types for reconciliation.
//!
//! Errors are categorized so callers can tell a bad request (nothing was
//! touched) from a system-level problem (the wrapped command misbehaved or
//! produced output we could not read). Every variant renders to text an
//! operator can act on.

use crate::types::{CommandResult, Mode, ObjectKind};
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller supplied parameters that cannot be honoured; detected before
    /// any command runs
    Validation,
    /// A query command produced output of an unexpected shape
    Parse,
    /// A wrapped command exited non-zero
    Command,
    /// The command could not be started at all
    Io,
}

impl ErrorCategory {
    /// Whether the system may have been touched when this error surfaced.
    pub fn is_system_level(&self) -> bool {
        !matches!(self, Self::Validation)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid parameters",
            Self::Parse => "Unexpected command output",
            Self::Command => "Command failed",
            Self::Io => "Command could not be executed",
        }
    }
}

/// Errors that can occur while reconciling an object.
#[derive(Debug, Error)]
pub enum Error {
    /// Attribute name not recognised for the object kind
    #[error("unsupported attribute '{attribute}' for {kind}")]
    UnsupportedAttribute { kind: ObjectKind, attribute: String },

    /// Mutually exclusive parameters supplied together
    #[error("conflicting parameters: {message}")]
    ConflictingMode { message: String },

    /// A parameter the operation cannot do without
    #[error("missing required parameter '{name}' for {kind}")]
    MissingParameter { kind: ObjectKind, name: String },

    /// A parameter value outside what the command accepts
    #[error("invalid value '{value}' for '{name}' ({kind}): {reason}")]
    InvalidValue {
        kind: ObjectKind,
        name: String,
        value: String,
        reason: String,
    },

    /// The kind has no command for this mode
    #[error("{kind} does not support {mode}")]
    UnsupportedMode { kind: ObjectKind, mode: Mode },

    /// Output did not have the expected structure
    #[error("unexpected output: {message}")]
    Parse {
        message: String,
        /// The text that failed to parse
        raw: String,
    },

    /// A command exited non-zero where success was required
    #[error("command failed (rc={}): {command}", .result.exit_code)]
    CommandFailed {
        command: String,
        result: CommandResult,
    },

    /// The program could not be spawned
    #[error("failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedAttribute { .. }
            | Self::ConflictingMode { .. }
            | Self::MissingParameter { .. }
            | Self::InvalidValue { .. }
            | Self::UnsupportedMode { .. } => ErrorCategory::Validation,
            Self::Parse { .. } => ErrorCategory::Parse,
            Self::CommandFailed { .. } => ErrorCategory::Command,
            Self::Spawn { .. } => ErrorCategory::Io,
        }
    }

    pub fn unsupported(kind: ObjectKind, attribute: impl Into<String>) -> Self {
        Self::UnsupportedAttribute {
            kind,
            attribute: attribute.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ConflictingMode {
            message: message.into(),
        }
    }

    pub fn missing(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::MissingParameter {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid(
        kind: ObjectKind,
        name: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            kind,
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Command output attached to this error, if any
    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            Self::CommandFailed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Full diagnostic text: the message plus any raw output involved.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Parse { raw, .. } if !raw.trim().is_empty() => {
                format!("{self}\n--- output ---\n{}", raw.trim_end())
            }
            Self::CommandFailed { result, .. } => {
                let mut text = self.to_string();
                if !result.stdout.trim().is_empty() {
                    text.push_str(&format!("\nstdout: {}", result.stdout.trim_end()));
                }
                if !result.stderr.trim().is_empty() {
                    text.push_str(&format!("\nstderr: {}", result.stderr.trim_end()));
                }
                text
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_not_system_level() {
        let err = Error::unsupported(ObjectKind::User, "colour");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(!err.category().is_system_level());
        assert_eq!(err.to_string(), "unsupported attribute 'colour' for user");
    }

    #[test]
    fn test_invalid_value_names_parameter() {
        let err = Error::invalid(ObjectKind::Tunable, "component", "foo", "not a tuning command");
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(
            err.to_string(),
            "invalid value 'foo' for 'component' (tunable): not a tuning command"
        );
    }

    #[test]
    fn test_parse_diagnostic_includes_raw_output() {
        let err = Error::parse("no header line", "garbage\n");
        assert_eq!(err.category(), ErrorCategory::Parse);
        let text = err.diagnostic();
        assert!(text.contains("no header line"));
        assert!(text.ends_with("garbage"));
    }

    #[test]
    fn test_command_failed_diagnostic_echoes_streams() {
        let err = Error::CommandFailed {
            command: "rmuser -p bob".into(),
            result: CommandResult::new(1, "", "3004-687 User \"bob\" does not exist.\n"),
        };
        let text = err.diagnostic();
        assert!(text.starts_with("command failed (rc=1): rmuser -p bob"));
        assert!(text.contains("stderr: 3004-687"));
        assert!(!text.contains("stdout:"));
        assert!(err.result().is_some());
    }
}
