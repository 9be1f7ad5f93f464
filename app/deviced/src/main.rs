use anyhow::{Context, Result};
use clap::Parser;
use deviced_core::{System, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "deviced")]
#[command(author, version, about = "Container reconciliation daemon", long_about = None)]
struct DaemonArgs {
    /// Configuration file path.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deviced=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = DaemonArgs::parse();
    let config_path = std::path::absolute(&args.config)
        .unwrap_or_else(|_| args.config.clone());

    info!(config = %config_path.display(), "starting deviced");
    System::new(config_path)
        .run()
        .await
        .context("daemon exited with error")?;
    Ok(())
}
