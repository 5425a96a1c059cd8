//! Structured logging setup using the `tracing` ecosystem.
//!
//! A compact console layer on stderr plus a daily-rotated file layer,
//! optionally JSON. Frame-level socket and protocol detail is emitted at
//! `debug`, so the websocket and TLS crates are capped at `warn` unless a
//! directive names them explicitly.

use std::path::Path;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::rolling;

use crate::error::{LwError, LwResult};

/// Transport crates that are noisy below `warn`.
const QUIET_TARGETS: &[&str] = &["tungstenite", "tokio_tungstenite", "rustls", "hyper", "reqwest"];

/// Build the filter for `level`.
///
/// `RUST_LOG`, when set and valid, takes precedence. An unparseable `level`
/// falls back to `info`.
pub fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    for target in QUIET_TARGETS {
        if level.contains(target) {
            continue;
        }
        if let Ok(directive) = format!("{target}=warn").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Initialize the global tracing subscriber.
///
/// * `level` - Log level or filter directive, e.g. "info" or "lw_socket=debug"
/// * `log_dir` - Directory for `livewire.log.*` files, created if missing
/// * `json_output` - If true, the file layer writes JSON lines
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> LwResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "livewire.log"));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let json_layer = json_output.then(|| {
        fmt::layer()
            .with_writer(non_blocking.clone())
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });
    let text_layer = (!json_output).then(|| {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(console_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| LwError::Internal(format!("logging already initialized: {e}")))?;

    tracing::info!("logging initialized at level={level}, dir={}", log_dir.display());

    Ok(LogGuard { _guard: guard })
}

/// Keeps the non-blocking file writer alive; dropping it flushes the log.
pub struct LogGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Console-only logger for tests and quick CLI runs. Repeat calls are no-ops.
pub fn init_console_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
