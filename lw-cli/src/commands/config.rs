//! Configuration commands.

use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use dialoguer::{Confirm, Input, Password};

use lw_core::config::{AppConfig, ConfigHandle};
use lw_core::error::{LwError, LwResult};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (tokens masked).
    Show,
    /// Print the configuration file path.
    Path,
    /// Get a setting value by key path.
    Get {
        /// Setting key path (e.g., "chat.channel", "socket.reconnect_limit").
        key: String,
    },
    /// Set a setting value by key path and save.
    Set {
        /// Setting key path.
        key: String,
        /// New value.
        value: String,
    },
    /// Interactively create a configuration file.
    Init,
}

fn get_setting_value(cfg: &AppConfig, key: &str) -> Option<String> {
    match key {
        "twitch.client_id" => Some(cfg.twitch.client_id.clone()),
        "twitch.access_token" => Some(mask(&cfg.twitch.access_token)),
        "twitch.login" => Some(cfg.twitch.login.clone()),
        "api.base_url" => Some(cfg.api.base_url.clone()),
        "api.timeout_ms" => Some(cfg.api.timeout_ms.to_string()),
        "socket.reconnect_limit" => Some(cfg.socket.reconnect_limit.to_string()),
        "socket.reconnect_interval_ms" => Some(cfg.socket.reconnect_interval_ms.to_string()),
        "socket.immediate_first_retry" => Some(cfg.socket.immediate_first_retry.to_string()),
        "chat.url" => Some(cfg.chat.url.clone()),
        "chat.channel" => Some(cfg.chat.channel.clone()),
        "chat.match_whole_word" => Some(cfg.chat.match_whole_word.to_string()),
        "chat.blocked_users" => Some(cfg.chat.blocked_users.join(",")),
        "chat.muted_words" => Some(cfg.chat.muted_words.join(",")),
        "eventsub.url" => Some(cfg.eventsub.url.clone()),
        "logging.level" => Some(cfg.logging.level.clone()),
        "logging.json_output" => Some(cfg.logging.json_output.to_string()),
        _ => None,
    }
}

fn set_setting_value(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), String> {
    let parse_bool = |v: &str| v.parse::<bool>().map_err(|_| "expected true/false".to_string());
    let list = |v: &str| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect::<Vec<_>>()
    };
    match key {
        "twitch.client_id" => cfg.twitch.client_id = value.to_string(),
        "twitch.access_token" => cfg.twitch.access_token = value.to_string(),
        "twitch.login" => cfg.twitch.login = value.to_lowercase(),
        "api.base_url" => cfg.api.base_url = value.trim_end_matches('/').to_string(),
        "api.timeout_ms" => {
            cfg.api.timeout_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "socket.reconnect_limit" => {
            cfg.socket.reconnect_limit = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "socket.reconnect_interval_ms" => {
            cfg.socket.reconnect_interval_ms = value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "socket.immediate_first_retry" => cfg.socket.immediate_first_retry = parse_bool(value)?,
        "chat.url" => cfg.chat.url = AppConfig::sanitize_ws_url(value),
        "chat.channel" => cfg.chat.channel = AppConfig::normalize_channel(value),
        "chat.match_whole_word" => cfg.chat.match_whole_word = parse_bool(value)?,
        "chat.blocked_users" => cfg.chat.blocked_users = list(value),
        "chat.muted_words" => cfg.chat.muted_words = list(value),
        "eventsub.url" => cfg.eventsub.url = AppConfig::sanitize_ws_url(value),
        "logging.level" => {
            let v = value.to_lowercase();
            if !["trace", "debug", "info", "warn", "error"].contains(&v.as_str()) {
                return Err("expected one of: trace, debug, info, warn, error".to_string());
            }
            cfg.logging.level = v;
        }
        "logging.json_output" => cfg.logging.json_output = parse_bool(value)?,
        _ => return Err(format!("unknown setting key: {key}")),
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "(not set)".to_string()
    } else {
        "********".to_string()
    }
}

fn print_config_text(cfg: &AppConfig) {
    println!("{}", style("Account").bold().underlined());
    println!("  twitch.client_id                {}", cfg.twitch.client_id);
    println!("  twitch.login                    {}", cfg.twitch.login);
    println!("  twitch.access_token             {}", mask(&cfg.twitch.access_token));

    println!();
    println!("{}", style("Sockets").bold().underlined());
    println!("  socket.reconnect_limit          {}", cfg.socket.reconnect_limit);
    println!("  socket.reconnect_interval_ms    {}", cfg.socket.reconnect_interval_ms);
    println!("  socket.immediate_first_retry    {}", cfg.socket.immediate_first_retry);

    println!();
    println!("{}", style("Chat").bold().underlined());
    println!("  chat.url                        {}", cfg.chat.url);
    println!("  chat.channel                    {}", cfg.chat.channel);
    println!("  chat.blocked_users              {}", cfg.chat.blocked_users.join(","));
    println!("  chat.muted_words                {}", cfg.chat.muted_words.join(","));
    println!("  chat.match_whole_word           {}", cfg.chat.match_whole_word);

    println!();
    println!("{}", style("Events").bold().underlined());
    println!("  api.base_url                    {}", cfg.api.base_url);
    println!("  eventsub.url                    {}", cfg.eventsub.url);

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level                   {}", cfg.logging.level);
    println!("  logging.json_output             {}", cfg.logging.json_output);
}

pub async fn run(
    config: ConfigHandle,
    config_path: PathBuf,
    action: ConfigAction,
    format: OutputFormat,
) -> LwResult<()> {
    match action {
        ConfigAction::Show => {
            let mut cfg = config.snapshot().await;
            match format {
                OutputFormat::Json => {
                    cfg.twitch.access_token = mask(&cfg.twitch.access_token);
                    let json = serde_json::to_string_pretty(&cfg)
                        .map_err(|e| LwError::Serialization(e.to_string()))?;
                    println!("{json}");
                }
                OutputFormat::Text => print_config_text(&cfg),
            }
        }
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Get { key } => {
            let cfg = config.read().await;
            match get_setting_value(&cfg, &key) {
                Some(value) => println!("{value}"),
                None => return Err(LwError::Config(format!("unknown setting key: {key}"))),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut cfg = config.write().await;
            set_setting_value(&mut cfg, &key, &value).map_err(LwError::Config)?;
            cfg.save_to_file(&config_path)?;
            println!("{} {key} updated", style("OK").green().bold());
        }
        ConfigAction::Init => init(config, &config_path).await?,
    }
    Ok(())
}

async fn init(config: ConfigHandle, path: &std::path::Path) -> LwResult<()> {
    if path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} exists. Overwrite?", path.display()))
            .default(false)
            .interact()
            .map_err(super::prompt_error)?;
        if !overwrite {
            println!("Keeping existing configuration.");
            return Ok(());
        }
    }

    let mut cfg = config.snapshot().await;
    let channel: String = Input::new()
        .with_prompt("Channel to join")
        .with_initial_text(cfg.chat.channel.clone())
        .allow_empty(true)
        .interact_text()
        .map_err(super::prompt_error)?;
    cfg.chat.channel = AppConfig::normalize_channel(&channel);

    let authenticate = Confirm::new()
        .with_prompt("Log in with an account? (No joins anonymously)")
        .default(cfg.is_authenticated())
        .interact()
        .map_err(super::prompt_error)?;
    if authenticate {
        let client_id: String = Input::new()
            .with_prompt("Client id")
            .with_initial_text(cfg.twitch.client_id.clone())
            .interact_text()
            .map_err(super::prompt_error)?;
        let login: String = Input::new()
            .with_prompt("Login")
            .with_initial_text(cfg.twitch.login.clone())
            .interact_text()
            .map_err(super::prompt_error)?;
        let token = Password::new()
            .with_prompt("Access token")
            .interact()
            .map_err(super::prompt_error)?;
        cfg.twitch.client_id = client_id.trim().to_string();
        cfg.twitch.login = login.trim().to_lowercase();
        cfg.twitch.access_token = token;
    } else {
        cfg.twitch.login.clear();
        cfg.twitch.access_token.clear();
    }

    cfg.save_to_file(path)?;
    println!("{} Wrote {}", style("OK").green().bold(), path.display());
    Ok(())
}
