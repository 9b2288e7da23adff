use clap::{Parser, Subcommand};
use rand::Rng;
use rand::distr::Alphanumeric;
use skinhub_client::SkinhubClient;
use skinhub_core::prelude::*;
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "skinhub")]
#[command(about = "CLI for the skinhub skin & cape server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL
    #[arg(short, long, env = "SKINHUB_URL", default_value = "http://localhost:3000")]
    url: String,

    /// Admin key for `delete` and `reset`
    #[arg(short, long, env = "SKINHUB_ADMIN_KEY")]
    key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a skin or cape for a player
    Upload {
        username: String,
        path: PathBuf,
        /// `skin` or `cape`
        #[arg(short = 't', long = "type", default_value = "skin")]
        kind: AssetKind,
        #[arg(long)]
        uuid: Option<String>,
    },
    /// Upload every `<username>.png` found in a directory
    Import {
        dir: PathBuf,
        #[arg(short = 't', long = "type", default_value = "skin")]
        kind: AssetKind,
    },
    /// Download a player's current skin or cape
    Download {
        username: String,
        #[arg(short = 't', long = "type", default_value = "skin")]
        kind: AssetKind,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List known players
    List,
    /// Show a player's record including history
    Show { username: String },
    /// Print the server counters
    Stats,
    /// Delete a player and their assets (admin)
    Delete { username: String },
    /// Delete every player and asset (admin)
    Reset {
        /// Required, there is no undo
        #[arg(long)]
        yes: bool,
    },
    /// Generate a random admin key
    GenerateKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = SkinhubClient::new(cli.url.clone(), cli.key.clone());

    match cli.command {
        Commands::GenerateKey => {
            let key: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(48)
                .map(char::from)
                .collect();

            println!("🔑 Generated admin key:");
            println!("\n    {key}\n");
            println!("Set it on your server:");
            println!("export SKINHUB_ADMIN_KEY=\"{key}\"");
        }
        Commands::Upload {
            username,
            path,
            kind,
            uuid,
        } => {
            let result = client
                .upload_file(&username, uuid.as_deref(), kind, &path)
                .await?;
            let note = if result.changed { "" } else { " (unchanged)" };
            println!("✅ {kind} uploaded for {}: {}{note}", result.username, result.hash);
        }
        Commands::Import { dir, kind } => {
            println!("🚀 Importing {kind}s from {dir:?}...");
            let mut count = 0;

            for entry in WalkDir::new(&dir).max_depth(1) {
                let entry = entry?;
                let path = entry.path();
                if !entry.file_type().is_file()
                    || path.extension().and_then(|e| e.to_str()) != Some("png")
                {
                    continue;
                }
                let Some(username) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                match client.upload_file(username, None, kind, path).await {
                    Ok(result) => {
                        println!("  {username}: {}", result.hash);
                        count += 1;
                    }
                    Err(e) => eprintln!("  ⚠️ {username}: {e}"),
                }
            }

            println!("✅ Imported {count} {kind}s.");
        }
        Commands::Download {
            username,
            kind,
            output,
        } => {
            let Some(data) = client.download(&username, kind).await? else {
                anyhow::bail!("{username} has no {kind}");
            };
            if let Some(parent) = output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&output, data).await?;

            println!("✅ Saved to {output:?}");
        }
        Commands::List => {
            let players = client.players().await?;
            for p in &players {
                println!(
                    "{:<16}  skin: {:<8}  cape: {:<8}  {}",
                    p.username,
                    p.skin.as_deref().map_or("-", |h| &h[..h.len().min(8)]),
                    p.cape.as_deref().map_or("-", |h| &h[..h.len().min(8)]),
                    p.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            println!("{} players", players.len());
        }
        Commands::Show { username } => match client.player(&username).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("Unknown player {username}"),
        },
        Commands::Stats => {
            let stats = client.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Delete { username } => {
            let summary = client.delete_player(&username).await?;
            println!(
                "🗑️ Deleted {username} ({} assets removed)",
                summary.assets_removed.len()
            );
        }
        Commands::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to reset without --yes");
            }
            let summary = client.reset().await?;
            println!(
                "🗑️ Removed {} players and {} assets",
                summary.players_removed,
                summary.assets_removed.len()
            );
        }
    }

    Ok(())
}
