use anyhow::{Context, Result};
use clap::Parser;
use modforge::cli::{ForgeCli, ModforgeCli};
use modforge::config::ForgeConfig;
use modforge::types::TenantId;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ModforgeCli::parse();

    // Initialize tracing
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting modforge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => ForgeConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ForgeConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    let tenant = TenantId::new(cli.tenant.clone().unwrap_or_else(|| config.tenant.clone()));
    debug!("Using data directory {} for tenant {}", config.data_dir.display(), tenant);

    ForgeCli::new(&config, tenant, cli.format)
        .run(cli.command)
        .await
}
