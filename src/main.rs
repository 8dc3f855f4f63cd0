// src/main.rs

//! The main entry point for the ShareGuard service.

use anyhow::Result;
use shareguard::config::Config;
use shareguard::core::resolver::StaticDirectory;
use shareguard::core::scanner::DumpSource;
use shareguard::core::state::AppState;
use shareguard::server;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();
    if args.contains(&"--version".to_string()) {
        println!("ShareGuard version {VERSION}");
        return Ok(());
    }

    // Determine the configuration path. It can be provided via a --config
    // flag; otherwise it defaults to "shareguard.toml". A missing file falls
    // back to the built-in defaults.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("shareguard.toml");

    let config = if Path::new(config_path).exists() {
        match Config::from_file(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e}");
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        )
        .compact()
        .with_ansi(true)
        .init();

    info!("Starting ShareGuard {VERSION}");

    // The replay seams: exported account and descriptor dumps. Either dump
    // may be absent; the service then starts empty and paths are added at
    // runtime.
    let directory = match StaticDirectory::from_file(&config.scanner.directory_dump) {
        Ok(directory) => Arc::new(directory),
        Err(e) => {
            warn!(
                "Could not load directory dump '{}': {e}. Starting with an empty directory.",
                config.scanner.directory_dump
            );
            Arc::new(StaticDirectory::new())
        }
    };
    let source = match DumpSource::from_file(&config.scanner.descriptor_dump) {
        Ok(source) => Arc::new(source),
        Err(e) => {
            warn!(
                "Could not load descriptor dump '{}': {e}. Starting with an empty tree.",
                config.scanner.descriptor_dump
            );
            Arc::new(DumpSource::new())
        }
    };

    let init = AppState::initialize(config, directory, source);
    server::run(init).await
}
