//! Livewire CLI - terminal client for live chat and event notifications.
//!
//! Useful for headless operation, scripting and debugging the real-time
//! layer against a live server.

mod commands;

use clap::{Parser, Subcommand};
use tracing::info;

use lw_core::config::{AppConfig, ConfigHandle};
use lw_core::error::LwResult;
use lw_core::logging;
use lw_core::platform;

/// Livewire - real-time chat and event notifications for live streams.
#[derive(Parser)]
#[command(
    name = "livewire",
    version,
    about = "Livewire live-stream chat and event CLI",
    long_about = "A command-line client for live-stream chat and event notifications.\n\
                  Join a channel's chat, send messages, and watch subscription events from the terminal."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a channel's chat, print messages and send typed lines.
    Chat {
        /// Channel to join (overrides config).
        #[arg(long)]
        channel: Option<String>,
        /// Login name for authenticated chat (overrides config).
        #[arg(long)]
        login: Option<String>,
        /// Access token (prompted for when a login is given without one).
        #[arg(long)]
        token: Option<String>,
    },
    /// Subscribe to an event topic and print its notifications.
    Eventsub {
        #[command(subcommand)]
        action: commands::eventsub::EventSubAction,
    },
    /// View and initialize the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> LwResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config.as_deref() {
        Some(path) => std::path::PathBuf::from(path),
        None => AppConfig::default_config_path()
            .unwrap_or_else(|_| std::path::PathBuf::from("config.toml")),
    };
    let config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging
    let log_level = if cli.verbose { "debug".to_string() } else { config.logging.level.clone() };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| std::path::PathBuf::from("logs"));
    let _guard = logging::init_logging(&log_level, &log_dir, config.logging.json_output)?;

    info!("Livewire CLI v{} on {}", lw_core::constants::APP_VERSION, platform::os_name());

    let config_handle = ConfigHandle::new(config);

    match cli.command {
        Commands::Chat { channel, login, token } => {
            commands::chat::run(config_handle, channel, login, token, cli.format).await
        }
        Commands::Eventsub { action } => {
            commands::eventsub::run(config_handle, action, cli.format).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, config_path, action, cli.format).await
        }
    }
}
