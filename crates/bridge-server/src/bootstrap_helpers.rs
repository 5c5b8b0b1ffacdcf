use bridge_cli::CliLogLevel;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` overrides `level` when set.
pub(crate) fn init_tracing(level: CliLogLevel) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub(crate) fn level_filter(level: CliLogLevel) -> LevelFilter {
    match level {
        CliLogLevel::Error => LevelFilter::ERROR,
        CliLogLevel::Warn => LevelFilter::WARN,
        CliLogLevel::Info => LevelFilter::INFO,
        CliLogLevel::Debug => LevelFilter::DEBUG,
    }
}
