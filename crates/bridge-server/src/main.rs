mod bootstrap_helpers;

use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_cli::{validate_bridge_cli, Cli};
use bridge_gateway::{run_gateway_server, GatewayServerConfig};
use bridge_provider::{resolve_executable, ClaudeCliClient, ClaudeCliConfig};
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;

fn build_client_config(cli: &Cli) -> ClaudeCliConfig {
    ClaudeCliConfig {
        executable: cli.claude_cli.trim().to_string(),
        timeout_ms: cli.claude_timeout_ms,
        default_model: cli.claude_model(),
        default_allowed_tools: cli.default_allowed_tools(),
    }
}

async fn run_bridge(cli: Cli) -> Result<()> {
    validate_bridge_cli(&cli)?;

    let client_config = build_client_config(&cli);
    match resolve_executable(&client_config.executable) {
        Some(path) => tracing::info!(path = %path.display(), "claude cli found"),
        None => tracing::warn!(
            executable = client_config.executable.as_str(),
            "claude cli not found on PATH; chat requests will fail until it is installed"
        ),
    }
    let client = ClaudeCliClient::new(client_config).context("failed to configure claude cli")?;
    let service_working_directory =
        std::env::current_dir().context("failed to resolve service working directory")?;

    run_gateway_server(GatewayServerConfig {
        client: Arc::new(client),
        bind: cli.bind_address(),
        api_keys: cli.api_keys(),
        ollama_api_enabled: cli.ollama_api_enabled,
        compat_model_name: cli.compat_model_name.trim().to_string(),
        service_working_directory,
    })
    .await
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);
    run_bridge(cli).await
}

#[cfg(test)]
mod tests {
    use super::{build_client_config, run_bridge};
    use crate::bootstrap_helpers::level_filter;
    use bridge_cli::{Cli, CliLogLevel};
    use clap::Parser;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn unit_client_config_carries_cli_defaults() {
        let cli = Cli::try_parse_from([
            "claude-bridge",
            "--claude-cli= /opt/claude/bin/claude ",
            "--claude-timeout-ms=9000",
            "--claude-model=claude-sonnet-4",
            "--default-allowed-tools=Read, Grep",
        ])
        .expect("parse cli");
        let config = build_client_config(&cli);
        assert_eq!(config.executable, "/opt/claude/bin/claude");
        assert_eq!(config.timeout_ms, 9_000);
        assert_eq!(config.default_model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(config.default_allowed_tools, vec!["Read", "Grep"]);
    }

    #[test]
    fn unit_level_filter_maps_every_log_level() {
        assert_eq!(level_filter(CliLogLevel::Error), LevelFilter::ERROR);
        assert_eq!(level_filter(CliLogLevel::Warn), LevelFilter::WARN);
        assert_eq!(level_filter(CliLogLevel::Info), LevelFilter::INFO);
        assert_eq!(level_filter(CliLogLevel::Debug), LevelFilter::DEBUG);
    }

    #[tokio::test]
    async fn regression_run_bridge_refuses_to_start_without_api_keys() {
        let cli = Cli::try_parse_from(["claude-bridge", "--host=127.0.0.1", "--api-keys="])
            .expect("parse cli");
        let error = run_bridge(cli).await.expect_err("missing keys");
        assert!(error.to_string().contains("--api-keys"));
    }
}
