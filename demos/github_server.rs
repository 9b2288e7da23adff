//! # GitHub Server Example
//!
//! Commits `players.json` and the assets to a GitHub repository.
//!
//! ## Usage
//!
//! ```sh
//! GITHUB_TOKEN=... SKINHUB_GITHUB_REPO=owner/repo SKINHUB_ADMIN_KEY=... \
//!     cargo run --example github_server --features "server github"
//! ```

use skinhub::prelude::*;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Config
    let token = env::var("GITHUB_TOKEN")?;
    let repository = env::var("SKINHUB_GITHUB_REPO")?;
    let mut github = GithubConfig::new(token, &repository)?;
    if let Ok(branch) = env::var("SKINHUB_GITHUB_BRANCH") {
        github.branch = branch;
    }
    if let Ok(prefix) = env::var("SKINHUB_GITHUB_PREFIX") {
        github.prefix = prefix;
    }

    let mut config = SkinhubServerConfig::default();
    if let Ok(admin_key) = env::var("SKINHUB_ADMIN_KEY") {
        config.admin_key = admin_key;
    }

    // Build
    let storage = GithubStorage::new(github)?;
    let app = SkinhubServer::new(config).build(storage);

    // Serve
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    println!("Server listening on http://{addr}, storing in {repository}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
