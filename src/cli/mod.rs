use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{API_URL_ENV, CONFIG_ENV, TOKEN_ENV};

#[derive(Parser)]
#[command(
    name = "you2downloader",
    about = "You2downloader - a Telegram bot that downloads YouTube videos or audio",
    version,
    long_about = "A Telegram bot that takes a YouTube link, asks whether you want the video or only the audio and in which quality, then downloads it with yt-dlp and sends the file back with live progress updates."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a YAML config file
    #[arg(short, long, global = true, env = CONFIG_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bot and serve chats until interrupted
    Run {
        /// Bot token issued by @BotFather
        #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
        token: Option<String>,

        /// Base address of the Bot API server
        #[arg(long, env = API_URL_ENV, value_name = "URL")]
        api_url: Option<String>,
    },

    /// Show or write the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that yt-dlp and ffmpeg are installed
    Check,

    /// List the format and quality options offered in chats
    Formats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_accepts_token_flag() {
        let cli = Cli::try_parse_from(["you2downloader", "run", "--token", "123:abc"]).unwrap();
        match cli.command {
            Commands::Run { token, .. } => assert_eq!(token.as_deref(), Some("123:abc")),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["you2downloader"]).is_err());
    }
}
