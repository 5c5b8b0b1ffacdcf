use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

use crate::Cli;

/// Rejects configurations the server could not start with.
pub fn validate_bridge_cli(cli: &Cli) -> Result<()> {
    if cli.api_keys().is_empty() {
        bail!("--api-keys (API_KEYS) must list at least one non-empty key");
    }
    let bind = cli.bind_address();
    bind.parse::<SocketAddr>()
        .with_context(|| format!("invalid bind address '{bind}' from --host/--port"))?;
    if cli.claude_cli.trim().is_empty() {
        bail!("--claude-cli (CLAUDE_CLI) must not be empty");
    }
    if cli.compat_model_name.trim().is_empty() {
        bail!("--compat-model-name (COMPAT_MODEL_NAME) must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_bridge_cli;
    use crate::Cli;
    use clap::Parser;

    fn parse_cli(args: &[&str]) -> Cli {
        let mut argv = vec!["claude-bridge", "--claude-cli=claude", "--port=3000"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse cli")
    }

    #[test]
    fn unit_validate_accepts_minimal_configuration() {
        let cli = parse_cli(&[
            "--host=127.0.0.1",
            "--api-keys=secret",
            "--compat-model-name=claude-code",
        ]);
        validate_bridge_cli(&cli).expect("valid configuration");
    }

    #[test]
    fn regression_validate_requires_non_blank_api_key() {
        let cli = parse_cli(&[
            "--host=127.0.0.1",
            "--api-keys= , ",
            "--compat-model-name=claude-code",
        ]);
        let error = validate_bridge_cli(&cli).expect_err("blank keys");
        assert!(error.to_string().contains("--api-keys"));
    }

    #[test]
    fn regression_validate_rejects_unresolvable_host() {
        let cli = parse_cli(&[
            "--api-keys=secret",
            "--host=bridge.internal",
            "--compat-model-name=claude-code",
        ]);
        let error = validate_bridge_cli(&cli).expect_err("hostname bind");
        assert!(error.to_string().contains("invalid bind address"));
    }
}
