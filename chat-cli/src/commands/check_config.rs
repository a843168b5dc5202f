//! Validate a client configuration file.

use anyhow::{Context, Result};
use std::path::Path;
use veil_chat_client::ClientConfig;

/// Run the check-config command.
pub fn run(path: &Path) -> Result<()> {
    let config = load(path)?;

    println!("Config OK: {}", path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn load(path: &Path) -> Result<ClientConfig> {
    ClientConfig::load(path).with_context(|| format!("Invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn accepts_valid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[reconnect]\nmax_attempts = 2\n").unwrap();

        assert!(run(&path).is_ok());
        assert_eq!(load(&path).unwrap().reconnect.max_attempts, 2);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[outbox]\ncapacity = 0\n").unwrap();

        let err = run(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("outbox.capacity"));
    }
}
