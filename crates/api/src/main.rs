//! Podsmith API server binary.
//!
//! Usage:
//!   podsmith-api --config podsmith.toml
//!   podsmith-api --port 8080
//!   podsmith-api --port 8080 --bind 0.0.0.0
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - API key for the model and speech backends
//! - `PODSMITH_BIND_ADDR` - Server bind address (default: 127.0.0.1)

use podsmith_api::{serve, AppState};
use podsmith_pipeline::{AppConfig, PodcastService};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,podsmith_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut port: u16 = 8080;
    let mut config_path: Option<String> = None;
    let mut bind_addr: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().expect("Invalid port number");
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    bind_addr = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Podsmith API Server");
                println!();
                println!("Usage: podsmith-api [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>     Port to listen on (default: 8080)");
                println!(
                    "  -b, --bind <ADDR>     Bind address (default: 127.0.0.1, env: PODSMITH_BIND_ADDR)"
                );
                println!("  -c, --config <FILE>   Path to a podsmith.toml file");
                println!("  -h, --help            Show this help message");
                println!();
                println!("Environment variables:");
                println!("  OPENAI_API_KEY        API key for the model and speech backends");
                println!("  PODSMITH_BIND_ADDR    Server bind address (overridden by --bind)");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let host = bind_addr
        .or_else(|| std::env::var("PODSMITH_BIND_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());

    if std::env::var("OPENAI_API_KEY").is_err() {
        tracing::warn!(
            "OPENAI_API_KEY not set; model and speech calls will fail unless a key \
             is provided in the config file."
        );
    }

    let config = if let Some(path) = config_path {
        tracing::info!(path = %path, "Loading configuration");
        AppConfig::from_file(&path)?
    } else {
        tracing::info!("Using default configuration");
        AppConfig::default()
    };

    let service = PodcastService::new(config).await?;
    let state = Arc::new(AppState::new(Arc::new(service)));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    serve(state, addr).await?;

    Ok(())
}
