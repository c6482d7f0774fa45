use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = commands::load_config(&cli)?;
    let level = if cli.verbose { "debug" } else { config.log.level.as_str() };
    setup_tracing(level);
    commands::run_command(cli, config).await
}

/// Respects `RUST_LOG` if set, otherwise uses `level`. Logs go to stderr so
/// `content get` can stream blobs to stdout.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
