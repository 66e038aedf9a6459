//! Install tree layout
//!
//! All paths the provisioning steps touch are derived from a handful of
//! roots so tests (and non-default installs) can relocate everything.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

/// Root directories of an installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallLayout {
    /// Binaries (`C:\Program Files\Procesure`)
    pub program_files: PathBuf,
    /// Configuration and state (`C:\ProgramData\Procesure`)
    pub program_data: PathBuf,
    /// Parent of user profile directories
    pub users_root: PathBuf,
    /// System hosts file
    pub hosts_file: PathBuf,
}

impl Default for InstallLayout {
    fn default() -> Self {
        Self {
            program_files: PathBuf::from(r"C:\Program Files\Procesure"),
            program_data: PathBuf::from(r"C:\ProgramData\Procesure"),
            users_root: PathBuf::from(r"C:\Users"),
            hosts_file: PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts"),
        }
    }
}

impl InstallLayout {
    /// Layout with every root placed under `base` (used by tests and portable installs)
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            program_files: base.join("Program Files").join("Procesure"),
            program_data: base.join("ProgramData").join("Procesure"),
            users_root: base.join("Users"),
            hosts_file: base.join("hosts"),
        }
    }

    pub fn server_dir(&self) -> PathBuf {
        self.program_files.join("server")
    }

    pub fn server_exe(&self) -> PathBuf {
        self.server_dir().join("sshd.exe")
    }

    pub fn server_data_dir(&self) -> PathBuf {
        self.program_data.join("ssh")
    }

    pub fn sshd_config_path(&self) -> PathBuf {
        self.server_data_dir().join("sshd_config")
    }

    pub fn agent_exe(&self) -> PathBuf {
        self.program_files.join("agent.exe")
    }

    pub fn agent_config_path(&self) -> PathBuf {
        self.program_data.join("agent-config.yml")
    }

    /// Per-user directory holding the Procesure-managed authorized_keys
    pub fn user_ssh_dir(&self, username: &str) -> PathBuf {
        self.users_root
            .join(username)
            .join(".procesure")
            .join("ssh")
    }

    pub fn authorized_keys_path(&self, username: &str) -> PathBuf {
        self.user_ssh_dir(username).join("authorized_keys")
    }

    /// Create the program files and program data roots
    pub fn ensure_roots(&self) -> Result<()> {
        fs::create_dir_all(&self.program_files)?;
        fs::create_dir_all(&self.program_data)?;
        Ok(())
    }
}
