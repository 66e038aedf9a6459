//! Tunnel agent component
//!
//! Writes the agent's tunnel definition. The agent binary itself is expected
//! to already be in place under the program files root.

use crate::config::AgentConfig;
use crate::env_path;
use crate::error::{ProcesureError, Result};
use crate::executor::Executor;
use crate::layout::InstallLayout;
use crate::provision::{Component, Step};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

/// Agent config schema version
pub const AGENT_CONFIG_VERSION: &str = "3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSection {
    pub authtoken: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnel {
    pub proto: String,
    pub addr: u16,
    pub remote_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunnels {
    pub tcp: Tunnel,
}

/// On-disk agent configuration
///
/// Rendered as JSON, which the agent's YAML loader accepts as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFile {
    pub version: String,
    pub agent: AgentSection,
    pub tunnels: Tunnels,
}

impl AgentFile {
    /// Tunnel forwarding `remote_addr` to the local server port
    pub fn new(config: &AgentConfig, local_port: u16) -> Self {
        Self {
            version: AGENT_CONFIG_VERSION.to_string(),
            agent: AgentSection {
                authtoken: config.token.clone(),
            },
            tunnels: Tunnels {
                tcp: Tunnel {
                    proto: "tcp".to_string(),
                    addr: local_port,
                    remote_addr: config.address.clone(),
                },
            },
        }
    }

    pub fn render(&self) -> Result<String> {
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        Ok(rendered)
    }
}

pub struct AgentManager<'a> {
    config: &'a AgentConfig,
    layout: &'a InstallLayout,
    local_port: u16,
}

impl<'a> AgentManager<'a> {
    pub fn new(config: &'a AgentConfig, layout: &'a InstallLayout, local_port: u16) -> Self {
        Self {
            config,
            layout,
            local_port,
        }
    }

    pub fn write_config(&self) -> Result<()> {
        let path = self.layout.agent_config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, AgentFile::new(self.config, self.local_port).render()?)?;
        info!("Agent configuration saved at {}", path.display());
        Ok(())
    }

    pub fn check_binary(&self) -> Result<()> {
        let exe = self.layout.agent_exe();
        if exe.exists() {
            Ok(())
        } else {
            Err(ProcesureError::MissingBinary(exe))
        }
    }

    /// Put the agent binary's directory on the user's PATH
    pub fn add_to_path(&self, executor: &dyn Executor) -> Result<()> {
        env_path::ensure_on_user_path(executor, &self.layout.program_files)?;
        Ok(())
    }
}

impl Component for AgentManager<'_> {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn steps(&self) -> Vec<Step<'_>> {
        vec![
            Step::new("validate", |_| self.config.validate()),
            Step::new("write-config", |_| self.write_config()),
            Step::new("binary", |_| self.check_binary()),
            Step::new("path", |exec| self.add_to_path(exec)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutcome, CommandOutput, MockExecutor};
    use tempfile::TempDir;

    fn agent_config() -> AgentConfig {
        AgentConfig {
            address: "1.tcp.example.io:23090".to_string(),
            token: "tok_123".to_string(),
        }
    }

    #[test]
    fn test_render_keeps_key_order() {
        let rendered = AgentFile::new(&agent_config(), 2222).render().unwrap();

        let version = rendered.find("\"version\"").unwrap();
        let agent = rendered.find("\"agent\"").unwrap();
        let tunnels = rendered.find("\"tunnels\"").unwrap();
        assert!(version < agent && agent < tunnels);
        assert!(rendered.contains("\"addr\": 2222"));
        assert!(rendered.contains("\"remote_addr\": \"1.tcp.example.io:23090\""));
        assert!(rendered.ends_with("}\n"));
    }

    #[test]
    fn test_write_config() {
        let temp_dir = TempDir::new().unwrap();
        let layout = InstallLayout::rooted_at(temp_dir.path());
        let config = agent_config();

        AgentManager::new(&config, &layout, 2222).write_config().unwrap();

        let written = fs::read_to_string(layout.agent_config_path()).unwrap();
        let parsed: AgentFile = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, AgentFile::new(&config, 2222));
        assert_eq!(parsed.agent.authtoken, "tok_123");
    }

    #[test]
    fn test_missing_binary() {
        let temp_dir = TempDir::new().unwrap();
        let layout = InstallLayout::rooted_at(temp_dir.path());
        let config = agent_config();
        let manager = AgentManager::new(&config, &layout, 2222);

        assert!(matches!(
            manager.check_binary(),
            Err(ProcesureError::MissingBinary(_))
        ));

        fs::create_dir_all(&layout.program_files).unwrap();
        fs::write(layout.agent_exe(), "").unwrap();
        assert!(manager.check_binary().is_ok());
    }

    #[test]
    fn test_path_step_uses_program_files() {
        let layout = InstallLayout::rooted_at("/base");
        let config = agent_config();
        let manager = AgentManager::new(&config, &layout, 2222);

        let mut mock = MockExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| {
                CommandOutcome::Succeeded(CommandOutput {
                    code: 0,
                    stdout: "/base/Program Files/Procesure".to_string(),
                    stderr: String::new(),
                })
            });

        manager.add_to_path(&mock).unwrap();
        let names: Vec<_> = manager.steps().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["validate", "write-config", "binary", "path"]);
    }
}
