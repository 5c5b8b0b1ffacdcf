//! Error taxonomy for assistant process invocation and decoding.

use thiserror::Error;

/// Failure raised while building, running or decoding one assistant invocation.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid invocation: {0}")]
    InvalidRequest(String),
    #[error("failed to spawn claude cli '{executable}': {message}")]
    Spawn { executable: String, message: String },
    #[error("{message}")]
    ProcessFailed {
        message: String,
        diagnostics: Option<String>,
    },
    #[error("{message}")]
    Decode { message: String, raw: String },
    #[error("claude cli timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("claude cli io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn process_failed(message: impl Into<String>, diagnostics: Option<String>) -> Self {
        Self::ProcessFailed {
            message: message.into(),
            diagnostics,
        }
    }

    pub fn decode(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Stable machine-readable reason attached to logs and error frames.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_invocation",
            Self::Spawn { .. } => "claude_cli_spawn_failed",
            Self::ProcessFailed { .. } => "claude_cli_process_failed",
            Self::Decode { .. } => "claude_cli_decode_failed",
            Self::Timeout { .. } => "claude_cli_timeout",
            Self::Io(_) => "claude_cli_io_failed",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// Captured stderr or raw stdout retained for diagnostics.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::ProcessFailed { diagnostics, .. } => diagnostics.as_deref(),
            Self::Decode { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_reason_codes_are_distinct_per_kind() {
        let errors = [
            BridgeError::InvalidRequest("x".to_string()),
            BridgeError::Spawn {
                executable: "claude".to_string(),
                message: "missing".to_string(),
            },
            BridgeError::process_failed("x", None),
            BridgeError::decode("x", "raw"),
            BridgeError::Timeout { timeout_ms: 5 },
            BridgeError::Io(std::io::Error::other("x")),
        ];
        let mut codes = errors.iter().map(BridgeError::reason_code).collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn unit_diagnostics_expose_retained_payloads() {
        let failed = BridgeError::process_failed("exit 2", Some("auth failed".to_string()));
        assert_eq!(failed.diagnostics(), Some("auth failed"));
        let decode = BridgeError::decode("bad json", "{oops");
        assert_eq!(decode.diagnostics(), Some("{oops"));
        assert_eq!(decode.to_string(), "bad json");
        assert!(BridgeError::Timeout { timeout_ms: 10 }.is_timeout());
        assert_eq!(
            BridgeError::Timeout { timeout_ms: 10 }.to_string(),
            "claude cli timed out after 10ms"
        );
    }
}
