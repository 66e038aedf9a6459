//! Remote desktop component

use crate::config::{validate_username, RdpConfig};
use crate::error::Result;
use crate::executor::{ps_quote, run_checked, CommandOutcome, CommandSpec, Executor};
use crate::hosts;
use crate::layout::InstallLayout;
use crate::provision::{Component, Step};
use tracing::info;

/// Local group that grants RDP logon rights
pub const RDP_USERS_GROUP: &str = "Remote Desktop Users";

pub struct RdpManager<'a> {
    config: &'a RdpConfig,
    layout: &'a InstallLayout,
}

impl<'a> RdpManager<'a> {
    pub fn new(config: &'a RdpConfig, layout: &'a InstallLayout) -> Self {
        Self { config, layout }
    }

    pub fn enable_rdp(&self, executor: &dyn Executor) -> Result<()> {
        let spec = CommandSpec::powershell(
            "Set-ItemProperty -Path 'HKLM:\\System\\CurrentControlSet\\Control\\Terminal Server' \
             -Name 'fDenyTSConnections' -Value 0",
        )
        .on_start("Enabling RDP on the machine")
        .on_success("RDP has been enabled")
        .on_error("Failed to enable RDP");
        run_checked(executor, &spec)?;
        Ok(())
    }

    /// Store the RDP credentials in Credential Manager under the alias IP
    pub fn create_credentials(&self, executor: &dyn Executor) -> Result<()> {
        validate_username(&self.config.username)?;
        let spec = CommandSpec::new("cmdkey")
            .arg(format!("/generic:{}", self.config.alias_ip))
            .arg(format!("/user:{}", self.config.username))
            .arg(format!("/pass:{}", self.config.password))
            .redacted()
            .on_start("Creating Windows credentials")
            .on_success(format!(
                "Credentials created for {}-{}",
                self.config.alias_name, self.config.alias_ip
            ));
        run_checked(executor, &spec)?;
        Ok(())
    }

    pub fn update_hosts_file(&self) -> Result<()> {
        hosts::ensure_alias(
            &self.layout.hosts_file,
            &self.config.alias_ip,
            &self.config.alias_name,
        )?;
        Ok(())
    }

    pub fn add_to_rdp_users(&self, executor: &dyn Executor) -> Result<()> {
        let username = &self.config.username;
        validate_username(username)?;
        let spec = CommandSpec::powershell(format!(
            "Add-LocalGroupMember -Group {} -Member {}",
            ps_quote(RDP_USERS_GROUP),
            ps_quote(username)
        ))
        .on_start(format!("Adding {} to the RDP users group", username));

        match executor.execute(&spec) {
            CommandOutcome::Failed(out) if out.stderr.contains("already a member") => {
                info!("{} is already in '{}'", username, RDP_USERS_GROUP);
                Ok(())
            }
            outcome => {
                outcome.into_result(&spec.program)?;
                info!("{} added to '{}'", username, RDP_USERS_GROUP);
                Ok(())
            }
        }
    }
}

impl Component for RdpManager<'_> {
    fn name(&self) -> &'static str {
        "rdp"
    }

    fn steps(&self) -> Vec<Step<'_>> {
        vec![
            Step::new("validate", |_| self.config.validate()),
            Step::new("enable-rdp", |exec| self.enable_rdp(exec)),
            Step::new("credentials", |exec| self.create_credentials(exec)),
            Step::new("hosts-alias", |_| self.update_hosts_file()),
            Step::new("rdp-users", |exec| self.add_to_rdp_users(exec)),
        ]
    }
}
