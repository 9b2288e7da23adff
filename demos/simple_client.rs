//! # Simple Client Example
//!
//! Uploads a skin, reads it back and lists the known players.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example simple_client --features "client"
//! ```

use skinhub::prelude::*;
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = SkinhubClient::new("http://localhost:3000", None);

    let result = client
        .upload_file("Steve", None, AssetKind::Skin, Path::new("assets/steve.png"))
        .await?;
    println!("Uploaded {} as {}", result.username, result.hash);

    if let Some(data) = client.download("Steve", AssetKind::Skin).await? {
        tokio::fs::write("downloaded_steve.png", data).await?;
        println!("Skin downloaded to downloaded_steve.png!");
    }

    for player in client.players().await? {
        println!("{} (updated {})", player.username, player.updated_at);
    }

    Ok(())
}
