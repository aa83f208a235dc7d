use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use you2downloader::conversation::menus;
use you2downloader::{bot, utils, Cli, Commands, Config, MediaKind};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "you2downloader=debug"
    } else {
        "you2downloader=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run { token, api_url } => {
            config.apply_overrides(token, api_url);
            config.validate()?;

            // Check for required external dependencies (non-fatal in Docker)
            for dep in utils::check_dependencies(&config.downloads.yt_dlp_path).await {
                tracing::warn!("Dependency check: {} (continuing anyway)", dep);
            }

            tracing::info!("Starting You2downloader bot...");
            bot::run(config).await?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = Config::config_path(cli.config.as_deref())?;
                config.save(&path).await?;
                println!("Configuration written to: {}", path.display());
                println!("Set {} in the environment rather than in the file.", you2downloader::config::TOKEN_ENV);
            }
        }
        Commands::Check => {
            let missing = utils::check_dependencies(&config.downloads.yt_dlp_path).await;
            if missing.is_empty() {
                println!("✅ yt-dlp and ffmpeg are available");
            } else {
                for dep in &missing {
                    println!("❌ {}", dep);
                }
                anyhow::bail!("{} required tool(s) missing", missing.len());
            }
        }
        Commands::Formats => {
            println!("Formats and qualities offered in chats:");
            for kind in MediaKind::ALL {
                println!("  {}", kind.label());
                for option in menus::quality_options(kind) {
                    println!("    • {} -> {}", option.label, option.selector);
                }
            }
        }
    }

    Ok(())
}
