//! OpenSSH server component
//!
//! Prepares a private sshd instance: config tree, host keys, firewall rule,
//! the user's authorized_keys, the `Match User` block, the Windows service
//! (pointed at our sshd_config) and the user PATH.

use crate::config::{validate_username, ServerConfig};
use crate::env_path;
use crate::error::{ProcesureError, Result};
use crate::executor::{run_checked, CommandSpec, Executor, POWERSHELL};
use crate::keys::AuthorizedKeys;
use crate::layout::InstallLayout;
use crate::provision::{Component, Step};
use crate::sshd_config;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Name of the inbound firewall rule for the server port
pub const FIREWALL_RULE: &str = "procesure-server";

/// Service name registered by `install-sshd.ps1`
pub const SSHD_SERVICE: &str = "sshd";

/// Host key types generated for the server
pub const HOST_KEY_TYPES: [&str; 3] = ["ed25519", "ecdsa", "rsa"];

/// Render the initial sshd_config for a fresh install
pub fn default_sshd_config(layout: &InstallLayout, port: u16) -> String {
    let data_dir = layout.server_data_dir();
    let mut config = String::from("# Procesure sshd configuration\n");
    config.push_str(&format!("Port {}\n", port));
    for key_type in HOST_KEY_TYPES {
        config.push_str(&format!(
            "HostKey {}\n",
            data_dir.join(format!("ssh_host_{}_key", key_type)).display()
        ));
    }
    config.push_str(&format!("PidFile {}\n", data_dir.join("sshd.pid").display()));
    config.push_str("PubkeyAuthentication yes\n");
    config.push_str("PasswordAuthentication no\n");
    config.push_str("AllowTcpForwarding yes\n");
    config.push_str("Subsystem sftp sftp-server.exe\n");
    config
}

fn require(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ProcesureError::MissingBinary(path.to_path_buf()))
    }
}

/// Installs and configures the Procesure sshd
pub struct ServerManager<'a> {
    config: &'a ServerConfig,
    layout: &'a InstallLayout,
}

impl<'a> ServerManager<'a> {
    pub fn new(config: &'a ServerConfig, layout: &'a InstallLayout) -> Self {
        Self { config, layout }
    }

    /// Create the data directory and seed sshd_config if it doesn't exist yet
    pub fn setup_program_data(&self) -> Result<()> {
        let data_dir = self.layout.server_data_dir();
        fs::create_dir_all(&data_dir)?;

        let config_path = self.layout.sshd_config_path();
        if !config_path.exists() {
            fs::write(&config_path, default_sshd_config(self.layout, self.config.port))?;
            info!("Wrote default sshd_config to {}", config_path.display());
        }
        Ok(())
    }

    /// Generate any missing host keys with the bundled ssh-keygen
    pub fn create_host_keys(&self, executor: &dyn Executor) -> Result<()> {
        let keygen = self.layout.server_dir().join("ssh-keygen.exe");
        require(&keygen)?;

        let data_dir = self.layout.server_data_dir();
        for key_type in HOST_KEY_TYPES {
            let key_path = data_dir.join(format!("ssh_host_{}_key", key_type));
            if key_path.exists() {
                debug!("Host key {} already exists", key_path.display());
                continue;
            }

            let spec = CommandSpec::new(keygen.to_string_lossy())
                .args(["-q", "-t", key_type, "-N", "", "-f"])
                .arg_path(&key_path)
                .dir(self.layout.server_dir())
                .on_start(format!("Generating {} host key...", key_type));
            run_checked(executor, &spec)?;
        }
        Ok(())
    }

    /// Allow inbound TCP on the server port, creating the rule only once
    pub fn configure_firewall(&self, executor: &dyn Executor) -> Result<()> {
        let query = CommandSpec::powershell(format!(
            "Get-NetFirewallRule -Name {} -ErrorAction SilentlyContinue",
            FIREWALL_RULE
        ));

        let exists = executor
            .execute(&query)
            .output()
            .map(|out| out.code == 0 && !out.stdout_trimmed().is_empty())
            .unwrap_or(false);
        if exists {
            info!("Firewall rule '{}' already exists", FIREWALL_RULE);
            return Ok(());
        }

        let create = CommandSpec::powershell(format!(
            "New-NetFirewallRule -Name {} -DisplayName 'Procesure Server' -Enabled True \
             -Direction Inbound -Protocol TCP -Action Allow -LocalPort {}",
            FIREWALL_RULE, self.config.port
        ))
        .on_start("Creating firewall rule...")
        .on_success("Firewall rule created")
        .on_error("Failed to create the firewall rule");
        run_checked(executor, &create)?;
        Ok(())
    }

    /// Add the configured key and lock the directory down to the user
    pub fn configure_authorized_keys(&self, executor: &dyn Executor) -> Result<()> {
        let username = &self.config.username;
        validate_username(username)?;
        let keys = AuthorizedKeys::new(self.layout.authorized_keys_path(username));
        keys.add(&self.config.public_key)?;

        let spec = CommandSpec::new("icacls")
            .arg_path(&self.layout.user_ssh_dir(username))
            .args(["/inheritance:r", "/grant:r"])
            .arg(format!("{}:F", username))
            .on_error(format!("Failed to restrict permissions for {}", username));
        run_checked(executor, &spec)?;

        info!("Configured authorized_keys for {}", username);
        Ok(())
    }

    /// Set the listening port and upsert the user's Match block
    pub fn update_sshd_config(&self) -> Result<()> {
        let path = self.layout.sshd_config_path();
        let username = &self.config.username;
        validate_username(username)?;

        sshd_config::set_directive(&path, "Port", &self.config.port.to_string())?;

        let keys_file = self.layout.authorized_keys_path(username);
        let (header, body) =
            sshd_config::match_user_block(username, &keys_file.to_string_lossy())?;
        sshd_config::upsert_block(&path, &header, &body)?;
        Ok(())
    }

    /// Register sshd as a Windows service with the bundled install scripts
    pub fn install_service(&self, executor: &dyn Executor) -> Result<()> {
        let server_dir = self.layout.server_dir();
        let install_script = server_dir.join("install-sshd.ps1");
        require(&install_script)?;

        let install = CommandSpec::new(POWERSHELL)
            .args(["-ExecutionPolicy", "Bypass", "-File"])
            .arg_path(&install_script)
            .dir(&server_dir)
            .on_start(format!("Installing sshd service from {}...", install_script.display()))
            .on_success("sshd service installed");
        run_checked(executor, &install)?;

        let fix_permissions = server_dir.join("FixHostFilePermissions.ps1");
        if fix_permissions.exists() {
            let spec = CommandSpec::powershell(format!(
                "& '{}' -Confirm:$false",
                fix_permissions.display()
            ))
            .dir(&server_dir)
            .on_start("Fixing host file permissions");
            run_checked(executor, &spec)?;
        }
        Ok(())
    }

    /// Point the service at our sshd.exe and sshd_config and start it automatically
    pub fn configure_service(&self, executor: &dyn Executor) -> Result<()> {
        let sshd_exe = self.layout.server_exe();
        require(&sshd_exe)?;

        let bin_path = format!(
            "\"{}\" -f \"{}\"",
            sshd_exe.display(),
            self.layout.sshd_config_path().display()
        );
        let spec = CommandSpec::new("sc.exe")
            .args(["config", SSHD_SERVICE, "binPath="])
            .arg(bin_path)
            .args(["start=", "auto"])
            .on_start("Configuring sshd service to use the Procesure config...")
            .on_success("sshd service configured");
        run_checked(executor, &spec)?;
        Ok(())
    }

    /// Restart the service so it picks up the current sshd_config
    pub fn restart_service(&self, executor: &dyn Executor) -> Result<()> {
        let spec = CommandSpec::powershell(format!("Restart-Service -Name {} -Force", SSHD_SERVICE))
            .on_start("Restarting sshd service...")
            .on_success("sshd service restarted")
            .on_error("Failed to restart sshd service");
        run_checked(executor, &spec)?;
        Ok(())
    }

    /// Put the bundled OpenSSH tools on the user's PATH
    pub fn add_to_path(&self, executor: &dyn Executor) -> Result<()> {
        env_path::ensure_on_user_path(executor, &self.layout.server_dir())?;
        Ok(())
    }
}

impl Component for ServerManager<'_> {
    fn name(&self) -> &'static str {
        "server"
    }

    fn steps(&self) -> Vec<Step<'_>> {
        vec![
            Step::new("validate", |_| self.config.validate()),
            Step::new("program-data", |_| self.setup_program_data()),
            Step::new("host-keys", |exec| self.create_host_keys(exec)),
            Step::new("firewall", |exec| self.configure_firewall(exec)),
            Step::new("authorized-keys", |exec| self.configure_authorized_keys(exec)),
            Step::new("sshd-config", |_| self.update_sshd_config()),
            Step::new("install-service", |exec| self.install_service(exec)),
            Step::new("configure-service", |exec| self.configure_service(exec)),
            Step::new("restart-service", |exec| self.restart_service(exec)),
            Step::new("path", |exec| self.add_to_path(exec)),
        ]
    }
}
