use clap::{ArgAction, Parser};

use crate::CliLogLevel;

pub const DEFAULT_CLAUDE_TIMEOUT_MS: u64 = 120_000;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "claude-bridge",
    about = "HTTP bridge exposing the claude CLI through native, Ollama, and OpenAI-compatible APIs",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "HOST",
        default_value = "0.0.0.0",
        help = "Interface the HTTP server binds to"
    )]
    pub host: String,

    #[arg(
        long,
        env = "PORT",
        default_value_t = 3000,
        help = "TCP port the HTTP server listens on"
    )]
    pub port: u16,

    #[arg(
        long = "api-keys",
        env = "API_KEYS",
        value_delimiter = ',',
        help = "Comma-separated API keys accepted via X-API-Key or Authorization: Bearer"
    )]
    pub api_keys: Vec<String>,

    #[arg(
        long = "claude-cli",
        env = "CLAUDE_CLI",
        default_value = "claude",
        help = "Path or name of the claude CLI executable"
    )]
    pub claude_cli: String,

    #[arg(
        long = "claude-timeout-ms",
        env = "CLAUDE_TIMEOUT_MS",
        default_value_t = DEFAULT_CLAUDE_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Deadline for one claude CLI invocation, including streamed ones"
    )]
    pub claude_timeout_ms: u64,

    #[arg(
        long = "claude-model",
        env = "CLAUDE_MODEL",
        help = "Model passed to the claude CLI when a native request does not name one"
    )]
    pub claude_model: Option<String>,

    #[arg(
        long = "default-allowed-tools",
        env = "DEFAULT_ALLOWED_TOOLS",
        value_delimiter = ',',
        help = "Comma-separated tools allowed when a native request does not list any"
    )]
    pub default_allowed_tools: Vec<String>,

    #[arg(
        long = "ollama-api-enabled",
        env = "OLLAMA_API_ENABLED",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Mount the unauthenticated Ollama and OpenAI-compatible routes"
    )]
    pub ollama_api_enabled: bool,

    #[arg(
        long = "compat-model-name",
        env = "COMPAT_MODEL_NAME",
        default_value = "claude-code",
        help = "Model name advertised by /api/tags and /v1/models"
    )]
    pub compat_model_name: String,

    #[arg(
        long = "log-level",
        env = "LOG_LEVEL",
        value_enum,
        ignore_case = true,
        default_value_t = CliLogLevel::Info,
        help = "Default tracing level when RUST_LOG is unset"
    )]
    pub log_level: CliLogLevel,
}

impl Cli {
    /// `host:port` in a form `SocketAddr` parses; IPv6 hosts are bracketed.
    pub fn bind_address(&self) -> String {
        let host = self.host.trim();
        let host = if host.eq_ignore_ascii_case("localhost") {
            "127.0.0.1"
        } else {
            host
        };
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// Configured keys with blanks dropped.
    pub fn api_keys(&self) -> Vec<String> {
        normalize_list(&self.api_keys)
    }

    pub fn default_allowed_tools(&self) -> Vec<String> {
        normalize_list(&self.default_allowed_tools)
    }

    pub fn claude_model(&self) -> Option<String> {
        self.claude_model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(str::to_string)
    }
}

fn normalize_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_positive_u64, Cli};
    use crate::CliLogLevel;
    use clap::Parser;

    #[test]
    fn unit_parse_positive_u64_rejects_zero_and_garbage() {
        assert_eq!(parse_positive_u64("250"), Ok(250));
        assert!(parse_positive_u64("0").is_err());
        assert!(parse_positive_u64("-5").is_err());
    }

    #[test]
    fn functional_cli_parses_lists_and_flags() {
        let cli = Cli::try_parse_from([
            "claude-bridge",
            "--host=::1",
            "--port=8080",
            "--api-keys= key-a ,,key-b",
            "--claude-timeout-ms=5000",
            "--claude-model= ",
            "--default-allowed-tools=Read,Grep",
            "--ollama-api-enabled=false",
            "--log-level=DEBUG",
        ])
        .expect("parse cli");
        assert_eq!(cli.bind_address(), "[::1]:8080");
        assert_eq!(cli.api_keys(), vec!["key-a", "key-b"]);
        assert_eq!(cli.claude_timeout_ms, 5_000);
        assert_eq!(cli.claude_model(), None);
        assert_eq!(cli.default_allowed_tools(), vec!["Read", "Grep"]);
        assert!(!cli.ollama_api_enabled);
        assert_eq!(cli.log_level, CliLogLevel::Debug);
    }

    #[test]
    fn regression_cli_rejects_zero_timeout() {
        let error = Cli::try_parse_from(["claude-bridge", "--claude-timeout-ms=0"])
            .expect_err("zero timeout must be rejected");
        assert!(error.to_string().contains("greater than 0"));
    }

    #[test]
    fn regression_cli_log_level_accepts_only_documented_levels() {
        for level in ["debug", "info", "warn", "error"] {
            let cli = Cli::try_parse_from(["claude-bridge", &format!("--log-level={level}")])
                .expect("parse cli");
            assert_eq!(cli.log_level.as_directive(), level);
        }
        assert!(Cli::try_parse_from(["claude-bridge", "--log-level=trace"]).is_err());
    }

    #[test]
    fn unit_bind_address_maps_localhost_to_loopback() {
        let cli = Cli::try_parse_from(["claude-bridge", "--host=localhost", "--port=9000"])
            .expect("parse cli");
        assert_eq!(cli.bind_address(), "127.0.0.1:9000");
    }
}
