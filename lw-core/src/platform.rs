//! Per-user directories for configuration and logs.

use std::path::PathBuf;

use crate::constants::APP_DIR_NAME;
use crate::error::{LwError, LwResult};

/// Directory holding `config.toml`, e.g. `~/.config/Livewire` on Linux.
pub fn config_dir() -> LwResult<PathBuf> {
    app_dir(dirs::config_dir(), "config")
}

/// Default log directory, e.g. `~/.local/share/Livewire/logs` on Linux.
pub fn default_log_dir() -> LwResult<PathBuf> {
    Ok(app_dir(dirs::data_dir(), "data")?.join("logs"))
}

fn app_dir(base: Option<PathBuf>, kind: &str) -> LwResult<PathBuf> {
    base.map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| LwError::Config(format!("could not determine {kind} directory")))
}

/// Human-readable name of the OS this binary was built for.
pub fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "macOS",
        "windows" => "Windows",
        "linux" => "Linux",
        other => other,
    }
}
