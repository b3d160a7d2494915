//! Process entry point: loads configuration, wires up tracing, builds the
//! router, and serves until a shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use mockhive_core::{observability, server, state::AppState, tenant, config::Config};

/// mockhive - multi-tenant HTTP mock server
#[derive(Parser)]
#[command(name = "mockhive")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a config.toml file (layered under defaults, under env vars).
    #[arg(long, default_value = "config.toml")]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Arc::new(Config::load_from_path(&cli.config)?);
    observability::init_tracing(&config)?;

    let state = AppState::new(config.clone());
    let _sweeper = tenant::spawn_rate_limit_sweeper(state.tenants.clone(), config.rate_limit.window());

    let app = server::build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.server.bind_addr, config.server.port).parse()?;

    server::serve(app, addr).await?;
    Ok(())
}
