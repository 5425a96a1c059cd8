//! Event-notification commands - listen for a topic or list server-side subscriptions.

use std::sync::Arc;

use clap::Subcommand;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::style;
use tracing::{info, warn};

use lw_api::SubscriptionFilter;
use lw_core::config::ConfigHandle;
use lw_core::error::{LwError, LwResult};
use lw_services::{EventBus, EventSubClient, Notification};
use lw_socket::SocketRegistry;

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum EventSubAction {
    /// Open a session, subscribe to a topic and print its notifications.
    Listen {
        /// Subscription type, e.g. channel.follow.
        topic: String,
        /// Subscription version.
        #[arg(long, default_value = "1")]
        version: String,
        /// Subscription condition as a JSON object.
        #[arg(long, default_value = "{}")]
        condition: String,
    },
    /// List subscriptions registered on the server.
    List {
        /// Only show subscriptions with this status.
        #[arg(long)]
        status: Option<String>,
        /// Only show subscriptions of this type.
        #[arg(long = "type")]
        topic: Option<String>,
    },
}

pub async fn run(config: ConfigHandle, action: EventSubAction, format: OutputFormat) -> LwResult<()> {
    match action {
        EventSubAction::Listen { topic, version, condition } => {
            listen(config, topic, version, condition, format).await
        }
        EventSubAction::List { status, topic } => list(config, status, topic, format).await,
    }
}

async fn listen(
    config: ConfigHandle,
    topic: String,
    version: String,
    condition: String,
    format: OutputFormat,
) -> LwResult<()> {
    let condition: serde_json::Value = serde_json::from_str(&condition)
        .map_err(|e| LwError::Config(format!("invalid --condition: {e}")))?;
    if !condition.is_object() {
        return Err(LwError::Config("--condition must be a JSON object".into()));
    }

    let api = super::create_api_client(&config).await?;
    let cfg = config.snapshot().await;
    if !cfg.is_authenticated() {
        return Err(LwError::MissingConfig("twitch.access_token".into()));
    }

    let bus = EventBus::default();
    let mut client =
        EventSubClient::new(SocketRegistry::with_tungstenite(), Arc::new(api), &cfg).with_event_bus(bus.clone());
    client.on(&topic, move |notification| {
        print_notification(notification, format);
        Ok(())
    });

    println!("{} Connecting to {}...", style("[eventsub]").bold().dim(), cfg.eventsub.url);
    let mut lifecycle = bus.subscribe();
    client.connect().await;

    loop {
        tokio::select! {
            input = client.next_event() => match input {
                Some(input) => {
                    client.handle_event(input).await;
                    ensure_subscribed(&mut client, &topic, &version, &condition).await;
                }
                None => {
                    println!("  {} Connection ended.", style("WARN").yellow());
                    break;
                }
            },
            event = lifecycle.recv() => {
                if let Ok(event) = event {
                    println!("  {} {:?}", style("[event]").dim(), event);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting and removing subscriptions...");
                if let Err(e) = client.disconnect().await {
                    warn!("cleanup task failed: {e}");
                }
                break;
            }
        }
    }

    Ok(())
}

/// Subscribe once per session; a fresh welcome starts with no subscriptions.
async fn ensure_subscribed(
    client: &mut EventSubClient,
    topic: &str,
    version: &str,
    condition: &serde_json::Value,
) {
    let needs_subscription = client
        .session()
        .is_some_and(|s| !s.is_reconnecting && !s.active_subscriptions.contains_key(topic));
    if !needs_subscription {
        return;
    }
    match client.subscribe(topic, version, condition.clone()).await {
        Ok(id) => {
            info!("subscribed to {topic} ({id})");
            println!("  {} Subscribed to {} ({})", style("OK").green().bold(), topic, id);
        }
        Err(e) => {
            println!("  {} Subscribe to {} failed: {}", style("FAIL").red().bold(), topic, e);
        }
    }
}

fn print_notification(notification: &Notification, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", notification.event),
        OutputFormat::Text => {
            let time = notification
                .timestamp
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| chrono::Local::now().format("%H:%M:%S").to_string());
            println!(
                "{} {} {}",
                style(time).dim(),
                style(&notification.subscription_type).cyan().bold(),
                super::truncate(&notification.event.to_string(), 240)
            );
        }
    }
}

async fn list(
    config: ConfigHandle,
    status: Option<String>,
    topic: Option<String>,
    format: OutputFormat,
) -> LwResult<()> {
    let api = super::create_api_client(&config).await?;
    let filter = SubscriptionFilter {
        status,
        subscription_type: topic,
        ..Default::default()
    };
    let subscriptions = api.list_eventsub_subscriptions(&filter).await?;

    match format {
        OutputFormat::Json => {
            let value = serde_json::to_string_pretty(&subscriptions)
                .map_err(|e| LwError::Serialization(e.to_string()))?;
            println!("{value}");
        }
        OutputFormat::Text => {
            if subscriptions.is_empty() {
                println!("No subscriptions.");
                return Ok(());
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(vec!["Id", "Type", "Version", "Status", "Session"]);
            for sub in &subscriptions {
                let status = if sub.status == "enabled" {
                    Cell::new(&sub.status).fg(Color::Green)
                } else {
                    Cell::new(&sub.status).fg(Color::Yellow)
                };
                table.add_row(vec![
                    Cell::new(&sub.id),
                    Cell::new(&sub.subscription_type),
                    Cell::new(&sub.version),
                    status,
                    Cell::new(sub.transport.session_id.as_deref().unwrap_or("-")),
                ]);
            }
            println!("{table}");
            println!("  {} total", subscriptions.len());
        }
    }
    Ok(())
}
