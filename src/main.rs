use clap::Parser;
use tracing_subscriber::EnvFilter;

use maskgate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, port } => {
            maskgate::cli::serve::run(config.as_deref(), port).await?;
        }
        Commands::Scan { path, config } => {
            let found = maskgate::cli::scan::run(path.as_deref(), config.as_deref())?;
            if found > 0 {
                std::process::exit(1);
            }
        }
        Commands::CheckConfig { config } => {
            maskgate::cli::check_config::run(config.as_deref())?;
        }
    }

    Ok(())
}
