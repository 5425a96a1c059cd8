//! Chat command - join a channel and relay chat to the terminal.

use console::style;
use dialoguer::Password;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

use lw_core::config::{AppConfig, ConfigHandle};
use lw_core::error::{LwError, LwResult};
use lw_services::chat::{ChatClient, ChatMessage, NoticeKind, ReplyTo};
use lw_services::EventBus;
use lw_socket::SocketRegistry;

use crate::OutputFormat;

/// Run the chat command.
pub async fn run(
    config: ConfigHandle,
    channel: Option<String>,
    login: Option<String>,
    token: Option<String>,
    format: OutputFormat,
) -> LwResult<()> {
    // Channel and credentials: args > config > interactive prompt
    {
        let mut cfg = config.write().await;
        if let Some(channel) = channel {
            cfg.chat.channel = channel;
        }
        if let Some(login) = login {
            cfg.twitch.login = login;
            cfg.twitch.access_token = match token {
                Some(token) => token,
                None if cfg.twitch.access_token.is_empty() => Password::new()
                    .with_prompt("Access token")
                    .interact()
                    .map_err(super::prompt_error)?,
                None => cfg.twitch.access_token.clone(),
            };
        }
    }

    let cfg = config.snapshot().await;
    let channel = AppConfig::normalize_channel(&cfg.chat.channel);
    if channel.is_empty() {
        error!("no chat channel configured. Use --channel or set chat.channel in config.");
        return Err(LwError::MissingConfig("chat channel".into()));
    }

    println!(
        "{} Connecting to {} as {}...",
        style("[chat]").bold().dim(),
        channel,
        if cfg.is_authenticated() { cfg.twitch.login.as_str() } else { "anonymous" }
    );

    let bus = EventBus::default();
    let mut client = ChatClient::new(SocketRegistry::with_tungstenite(), &cfg).with_event_bus(bus.clone());
    register_printers(&mut client, format);

    let mut lifecycle = bus.subscribe();
    client.connect().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    println!("  Type a message and press Enter. /me, /reply <id>, /join and /part are supported. (Ctrl+C to stop)");
    println!();

    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(event) => client.handle_event(event),
                None => {
                    println!("  {} Connection ended.", style("WARN").yellow());
                    break;
                }
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_typed_line(&mut client, &channel, line.trim()),
                Ok(None) | Err(_) => stdin_open = false,
            },
            event = lifecycle.recv() => {
                if let Ok(event) = event {
                    println!("  {} {:?}", style("[event]").dim(), event);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                client.disconnect();
                break;
            }
        }
    }

    Ok(())
}

fn handle_typed_line(client: &mut ChatClient, channel: &str, line: &str) {
    if line.is_empty() {
        return;
    }
    let sent = if let Some(action) = line.strip_prefix("/me ") {
        client.send_action(channel, action)
    } else if let Some(target) = line.strip_prefix("/join ") {
        client.join(target)
    } else if let Some(target) = line.strip_prefix("/part ") {
        client.part(target)
    } else if let Some(rest) = line.strip_prefix("/reply ") {
        match rest.split_once(' ') {
            Some((parent, body)) => client.send_message(channel, body, Some(&ReplyTo::new(parent))),
            None => false,
        }
    } else {
        client.send_message(channel, line, None)
    };
    if !sent {
        println!("  {} Not sent.", style("WARN").yellow());
    }
}

fn print_message(message: &ChatMessage, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "channel": message.channel,
                "id": message.id,
                "user": message.user_login,
                "display_name": message.display_name,
                "body": message.body,
                "action": message.is_action,
                "self": message.is_self,
                "timestamp": message.timestamp.map(|t| t.to_rfc3339()),
            });
            println!("{value}");
        }
        OutputFormat::Text => {
            let time = message
                .timestamp
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
                .unwrap_or_else(|| chrono::Local::now().format("%H:%M").to_string());
            let name = if message.is_moderator() {
                style(message.display_name.clone()).green().bold()
            } else {
                style(message.display_name.clone()).cyan().bold()
            };
            if message.is_action {
                println!("{} {} * {} {}", style(time).dim(), style(&message.channel).dim(), name, style(&message.body).italic());
            } else {
                println!("{} {} {}: {}", style(time).dim(), style(&message.channel).dim(), name, message.body);
            }
        }
    }
}

fn register_printers(client: &mut ChatClient, format: OutputFormat) {
    client.on_message(move |message| {
        print_message(message, format);
        Ok(())
    });
    client.on_notice(|notice| {
        let label = match notice.kind {
            NoticeKind::AuthFailed => style("AUTH").red().bold(),
            NoticeKind::Welcome => style("OK").green().bold(),
            NoticeKind::Other => style("NOTICE").yellow(),
        };
        println!("  {label} {}", notice.message);
        Ok(())
    });
    client.on_user_notice(|notice| {
        let text = notice
            .system_message
            .as_deref()
            .or(notice.message.as_deref())
            .unwrap_or_default();
        println!("  {} {}", style(format!("[{}]", notice.msg_id.as_deref().unwrap_or("usernotice"))).magenta(), super::truncate(text, 200));
        Ok(())
    });
    client.on_clear_chat(|clear| {
        match (&clear.target, clear.ban_duration_secs) {
            (None, _) => println!("  {} chat cleared in {}", style("MOD").red(), clear.channel),
            (Some(user), Some(secs)) => println!("  {} {user} timed out for {secs}s", style("MOD").red()),
            (Some(user), None) => println!("  {} {user} banned", style("MOD").red()),
        }
        Ok(())
    });
    client.on_clear_message(|clear| {
        println!(
            "  {} message from {} deleted",
            style("MOD").red(),
            clear.login.as_deref().unwrap_or("someone")
        );
        Ok(())
    });
}
