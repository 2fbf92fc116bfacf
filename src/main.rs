//! github-connector CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use github_connector::cli::Cli;
use github_connector::config::credentials::missing_env_vars;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the process environment still applies
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let missing = missing_env_vars();
    if !missing.is_empty() {
        warn!(?missing, "Environment variables not set; pass credentials explicitly");
    }

    // Parse and execute CLI
    let cli = Cli::parse();
    cli.execute().await
}
