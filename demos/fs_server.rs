//! # Filesystem Server Example
//!
//! Stores `players.json` and the PNG assets in a local directory.
//!
//! ## Usage
//!
//! ```sh
//! SKINHUB_ADMIN_KEY=... cargo run --example fs_server --features "server fs"
//! ```

use skinhub::prelude::*;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Config
    let data_dir = env::var("SKINHUB_DATA_DIR").unwrap_or_else(|_| "./skinhub_data".to_string());
    let mut config = SkinhubServerConfig::default();
    if let Ok(admin_key) = env::var("SKINHUB_ADMIN_KEY") {
        config.admin_key = admin_key;
    }
    if let Some(limit) = env::var("SKINHUB_HISTORY_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        config.registry.history_limit = limit;
    }
    if let Ok(path) = env::var("SKINHUB_DEFAULT_SKIN") {
        config.default_skin = Some(tokio::fs::read(path).await?.into());
    }

    // Build
    let storage = FileSystemStorage::new(data_dir);
    let app = SkinhubServer::new(config).build(storage);

    // Serve
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    println!("Server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
