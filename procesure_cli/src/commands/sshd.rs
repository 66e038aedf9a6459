//! Sshd command - Edit sshd_config directly

use anyhow::{Context, Result};
use colored::Colorize;
use procesure_core::sshd_config::{self, UpsertAction};
use std::path::{Path, PathBuf};

use super::{info, success};
use crate::config::ConfigFile;

/// Upsert the `Match User` block for `user` into the sshd_config at `path`
pub fn apply_match_user(path: &Path, user: &str, keys_file: &str) -> Result<UpsertAction> {
    let (header, body) = sshd_config::match_user_block(user, keys_file)?;
    let action = sshd_config::upsert_block(path, &header, &body)
        .with_context(|| format!("Failed to update {}", path.display()))?;
    Ok(action)
}

/// File to edit and AuthorizedKeysFile value.
///
/// The config file is only read for the values not given on the command line.
pub fn resolve_targets(
    user: &str,
    file: Option<PathBuf>,
    keys_file: Option<String>,
    config: &ConfigFile,
) -> Result<(PathBuf, String)> {
    if let (Some(file), Some(keys_file)) = (&file, &keys_file) {
        return Ok((file.clone(), keys_file.clone()));
    }

    let layout = config.load()?.layout;
    let path = file.unwrap_or_else(|| layout.sshd_config_path());
    let keys_file = keys_file
        .unwrap_or_else(|| layout.authorized_keys_path(user).to_string_lossy().into_owned());
    Ok((path, keys_file))
}

pub async fn match_user(
    user: String,
    file: Option<PathBuf>,
    keys_file: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = ConfigFile::locate(config_path)?;
    let (path, keys_file) = resolve_targets(&user, file, keys_file, &config)?;

    info(&format!("Editing {}", path.display().to_string().cyan()));
    let action = apply_match_user(&path, &user, &keys_file)?;

    match action {
        UpsertAction::Inserted => success(&format!("Added Match block for {}", user.cyan())),
        UpsertAction::Replaced => success(&format!("Updated Match block for {}", user.cyan())),
    }
    println!(
        "  {} Original kept at {}",
        "→".cyan(),
        sshd_config::backup_path(&path).display().to_string().dimmed()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_apply_inserts_then_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sshd_config");
        fs::write(&path, "Port 22\n").unwrap();

        let first = apply_match_user(&path, "alice", "C:/keys/a").unwrap();
        let second = apply_match_user(&path, "alice", "C:/keys/b").unwrap();

        assert_eq!(first, UpsertAction::Inserted);
        assert_eq!(second, UpsertAction::Replaced);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Match User alice").count(), 1);
        assert!(content.contains("AuthorizedKeysFile C:/keys/b\n"));
        assert!(!content.contains("C:/keys/a"));
    }

    #[test]
    fn test_explicit_targets_skip_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigFile::at(temp_dir.path().join("config.json"));
        fs::write(config.path(), "{ not json").unwrap();

        let (path, keys) = resolve_targets(
            "alice",
            Some(PathBuf::from("/etc/ssh/sshd_config")),
            Some("keys".to_string()),
            &config,
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/etc/ssh/sshd_config"));
        assert_eq!(keys, "keys");

        assert!(resolve_targets("alice", Some(PathBuf::from("/x")), None, &config).is_err());
    }

    #[test]
    fn test_missing_targets_come_from_layout() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigFile::at(temp_dir.path().join("config.json"));

        let (path, keys) = resolve_targets("alice", None, None, &config).unwrap();
        let layout = procesure_core::InstallLayout::default();
        assert_eq!(path, layout.sshd_config_path());
        assert_eq!(keys, layout.authorized_keys_path("alice").to_string_lossy());
    }

    #[test]
    fn test_apply_rejects_bad_user() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sshd_config");

        assert!(apply_match_user(&path, "", "keys").is_err());
        assert!(apply_match_user(&path, "alice bob", "keys").is_err());
        assert!(apply_match_user(&path, "alice\nMatch all", "keys").is_err());
        assert!(!path.exists());
    }
}
