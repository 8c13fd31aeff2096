use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cert_sync::config::SyncConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
enum Args {
    /// Watch secrets and mirror their data onto the file system
    Run {
        /// Path to the sync configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Load and validate the configuration, print the resolved settings
    CheckConfig {
        /// Path to the sync configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Args::parse() {
        Args::Run { config } => {
            let config = SyncConfig::load(&config)?;
            cert_sync::run(config).await?;
        }
        Args::CheckConfig { config } => {
            let config = SyncConfig::load(&config)?;
            println!("{}", serde_yaml::to_string(&config)?);
        }
    };

    Ok(())
}
