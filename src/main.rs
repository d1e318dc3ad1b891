use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config_path: Option<String>,

    /// Directory to load `*.imp.json` files from, overriding the config file
    #[arg(short, long)]
    imposters: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imposter=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = match args.config_path {
        Some(path) => read_config(&path)?,
        None => imposter::Config::default(),
    };
    if let Some(dir) = args.imposters {
        config.imposters_dir = dir;
    }

    let (imposters, mgmt) = imposter::app(&config).await?;

    let mgmt_listener: SocketAddr = config.management_listener.parse()?;
    let listener: SocketAddr = config.listener.parse()?;

    tokio::spawn(async move {
        tracing::info!("management API listening on {}", mgmt_listener);
        if let Err(err) = axum::Server::bind(&mgmt_listener)
            .serve(mgmt.into_make_service())
            .await
        {
            tracing::error!("management API server failed: {}", err);
        }
    });

    tracing::info!("imposters listening on {}", listener);
    axum::Server::bind(&listener)
        .serve(imposters.into_make_service())
        .await?;

    Ok(())
}

fn read_config(config_path: &str) -> Result<imposter::Config> {
    let content = std::fs::read_to_string(config_path)?;
    Ok(toml::from_str(&content)?)
}
