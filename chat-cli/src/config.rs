//! Configuration lookup for veil-chat.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use veil_chat_client::ClientConfig;

/// File name looked up in the platform config directory.
const CONFIG_FILE: &str = "client.toml";

/// Default config location, e.g. `~/.config/veil-chat/client.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "veil", "veil-chat")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Load the client configuration.
///
/// An explicit path must exist. Without one the default location is
/// tried, falling back to built-in defaults when no file is there.
pub fn resolve(explicit: Option<&Path>) -> Result<ClientConfig> {
    if let Some(path) = explicit {
        return ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::debug!("Using config at {}", path.display());
            ClientConfig::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        _ => {
            tracing::debug!("No config file found, using defaults");
            Ok(ClientConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[server]\nurl = \"ws://10.0.0.2:4000\"\n").unwrap();

        let config = resolve(Some(&path)).unwrap();

        assert_eq!(config.server.url, "ws://10.0.0.2:4000");
    }

    #[test]
    fn missing_explicit_path_fails() {
        let dir = tempdir().unwrap();
        let result = resolve(Some(&dir.path().join("absent.toml")));

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("absent.toml"));
    }

    #[test]
    fn default_path_names_the_file() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(CONFIG_FILE));
        }
    }
}
