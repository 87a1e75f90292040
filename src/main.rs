//! # Audio Jobs - Entry Point
//! src/main.rs
//!
//! Parsea la configuración, inicializa el logging y arranca el servidor.

use audio_jobs::config::Config;
use audio_jobs::server::Server;
use std::fs;
use tracing_subscriber::EnvFilter;

fn main() {
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("❌ Invalid configuration: {}", e);
        std::process::exit(2);
    }

    // RUST_LOG tiene prioridad sobre --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();

    config.print_summary();

    for dir in [&config.output_dir, &config.uploads_dir] {
        if let Err(e) = fs::create_dir_all(dir) {
            tracing::error!(%dir, error = %e, "cannot create directory");
            std::process::exit(1);
        }
    }

    let server = Server::new(config);

    // Bloquea el thread principal
    if let Err(e) = server.run() {
        tracing::error!(error = %e, "fatal server error");
        std::process::exit(1);
    }
}
