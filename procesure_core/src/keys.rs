//! Authorized keys management
//!
//! Maintains the per-user `authorized_keys` file that the Procesure sshd
//! reads through its `Match User` block.

use crate::error::{ProcesureError, Result};
use ssh_key::PublicKey;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Parse a public key in OpenSSH format (`algorithm base64 [comment]`)
pub fn parse_public_key(key_str: &str) -> Result<PublicKey> {
    let parts: Vec<&str> = key_str.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ProcesureError::KeyParsing(
            "Invalid public key format".to_string(),
        ));
    }

    let key_data = format!("{} {}", parts[0], parts[1]);
    PublicKey::from_openssh(&key_data).map_err(|e| ProcesureError::KeyParsing(e.to_string()))
}

/// An `authorized_keys` file on disk
pub struct AuthorizedKeys {
    path: PathBuf,
}

impl AuthorizedKeys {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a public key unless it is already present.
    ///
    /// Keys are compared by their base64 body, so the same key with a
    /// different comment counts as present. Returns whether the key was added.
    pub fn add(&self, public_key: &str) -> Result<bool> {
        parse_public_key(public_key)?;
        let public_key = public_key.trim();

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        if self.path.exists() {
            let existing = fs::read_to_string(&self.path)?;
            let key_data = public_key.split_whitespace().nth(1).unwrap_or(public_key);
            let present = existing
                .lines()
                .any(|line| line.split_whitespace().any(|field| field == key_data));
            if present {
                debug!("Key already authorized in {}", self.path.display());
                return Ok(false);
            }

            // keep the new entry on its own line
            if !existing.is_empty() && !existing.ends_with('\n') {
                fs::write(&self.path, format!("{}\n", existing))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", public_key)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        info!("Authorized key added to {}", self.path.display());
        Ok(true)
    }

    /// List all authorized keys, skipping blanks and comments
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect())
    }
}
