//! Installation configuration
//!
//! The settings gathered before a provisioning run. Stored as JSON; every
//! section has defaults so partial files load.

use crate::error::{ProcesureError, Result};
use crate::layout::InstallLayout;
use serde::{Deserialize, Serialize};

/// Default port the Procesure sshd listens on
pub const DEFAULT_SERVER_PORT: u16 = 2222;

/// Default loopback alias used for RDP credentials
pub const DEFAULT_ALIAS_IP: &str = "127.0.0.2";

/// Default hostname alias for the RDP endpoint
pub const DEFAULT_ALIAS_NAME: &str = "procesure";

/// Why `username` can't be written into sshd_config or a command line
fn username_problem(username: &str) -> Option<&'static str> {
    if username.is_empty() {
        Some("is empty")
    } else if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("must not contain whitespace or control characters")
    } else if username.chars().any(|c| matches!(c, '\'' | '"' | '`')) {
        Some("must not contain quotes")
    } else {
        None
    }
}

/// Check that an account name is safe to use in a `Match User` header,
/// a path, and quoted PowerShell arguments
pub fn validate_username(username: &str) -> Result<()> {
    match username_problem(username) {
        Some(problem) => Err(ProcesureError::InvalidConfig(format!(
            "user name '{}' {}",
            username.escape_debug(),
            problem
        ))),
        None => Ok(()),
    }
}

/// OpenSSH server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Account allowed to log in with `public_key`
    pub username: String,
    /// OpenSSH-format public key (`ssh-ed25519 AAAA... comment`)
    pub public_key: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        validate_username(&self.username)?;
        if self.public_key.trim().is_empty() {
            return Err(ProcesureError::InvalidConfig(
                "server public key is empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(ProcesureError::InvalidConfig(
                "server port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            public_key: String::new(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

/// Tunnel agent settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Reserved TCP address, `hostname:port`
    pub address: String,
    /// Token that authorizes the agent to bind `address`
    pub token: String,
}

impl AgentConfig {
    /// Split `address` into host and port, validating both
    pub fn host_port(&self) -> Result<(&str, u16)> {
        let invalid = || {
            ProcesureError::InvalidConfig(format!(
                "agent address '{}' must be in the form 'hostname:port', e.g. '1.tcp.example.io:23090'",
                self.address
            ))
        };

        let (host, port) = self.address.rsplit_once(':').ok_or_else(invalid)?;
        let host_ok = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if !host_ok || port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        match port.parse::<u32>() {
            Ok(port @ 1..=65535) => Ok((host, port as u16)),
            _ => Err(ProcesureError::InvalidConfig(format!(
                "agent port {} must be between 1 and 65535",
                port
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.host_port()?;
        if self.token.trim().is_empty() {
            return Err(ProcesureError::InvalidConfig(
                "agent token is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Remote desktop settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RdpConfig {
    pub username: String,
    pub password: String,
    pub alias_ip: String,
    pub alias_name: String,
}

impl Default for RdpConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            alias_ip: DEFAULT_ALIAS_IP.to_string(),
            alias_name: DEFAULT_ALIAS_NAME.to_string(),
        }
    }
}

impl RdpConfig {
    pub fn validate(&self) -> Result<()> {
        validate_username(&self.username)
    }
}

// Keep the password out of logs and panic messages.
impl std::fmt::Debug for RdpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdpConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("alias_ip", &self.alias_ip)
            .field("alias_name", &self.alias_name)
            .finish()
    }
}

/// Everything needed for a full provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallationConfig {
    pub layout: InstallLayout,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub rdp: RdpConfig,
}

impl InstallationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Problems that would make a provisioning step fail, one message per problem
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(problem) = username_problem(&self.server.username) {
            problems.push(format!("server.username {}", problem));
        }
        if self.server.public_key.trim().is_empty() {
            problems.push("server.public_key is empty".to_string());
        }
        if self.server.port == 0 {
            problems.push("server.port must be between 1 and 65535".to_string());
        }
        if let Err(e) = self.agent.validate() {
            problems.push(e.to_string());
        }
        if let Some(problem) = username_problem(&self.rdp.username) {
            problems.push(format!("rdp.username {}", problem));
        }

        problems
    }

    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProcesureError::InvalidConfig(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> InstallationConfig {
        InstallationConfig {
            server: ServerConfig {
                username: "alice".to_string(),
                public_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFakeKey alice@laptop".to_string(),
                port: DEFAULT_SERVER_PORT,
            },
            agent: AgentConfig {
                address: "1.tcp.example.io:23090".to_string(),
                token: "secret".to_string(),
            },
            rdp: RdpConfig {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
                ..RdpConfig::default()
            },
            ..InstallationConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = InstallationConfig::default();
        assert_eq!(config.server.port, 2222);
        assert_eq!(config.rdp.alias_ip, "127.0.0.2");
        assert_eq!(config.rdp.alias_name, "procesure");
    }

    #[test]
    fn test_agent_address_validation() {
        let mut agent = AgentConfig {
            address: "1.tcp.example.io:23090".to_string(),
            token: "t".to_string(),
        };
        assert_eq!(agent.host_port().unwrap(), ("1.tcp.example.io", 23090));
        assert!(agent.validate().is_ok());

        for bad in ["", "host", "host:", ":80", "ho st:80", "host:0", "host:70000", "host:8x"] {
            agent.address = bad.to_string();
            assert!(agent.validate().is_err(), "'{}' should be rejected", bad);
        }
    }

    #[test]
    fn test_agent_requires_token() {
        let agent = AgentConfig {
            address: "example.io:1".to_string(),
            token: "  ".to_string(),
        };
        assert!(agent.validate().is_err());
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let err = InstallationConfig::default().validate().unwrap_err();
        let message = err.to_string();

        assert!(message.contains("server.username"));
        assert!(message.contains("server.public_key"));
        assert!(message.contains("agent address"));
        assert!(message.contains("rdp.username"));
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip_and_partial() {
        let config = valid_config();
        let json = config.to_json().unwrap();
        assert_eq!(InstallationConfig::from_json(&json).unwrap(), config);

        let partial = InstallationConfig::from_json(r#"{"server": {"username": "bob"}}"#).unwrap();
        assert_eq!(partial.server.username, "bob");
        assert_eq!(partial.server.port, DEFAULT_SERVER_PORT);
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("DOMAIN\\alice").is_ok());

        for bad in ["", "alice bob", "alice\nPasswordAuthentication yes", "al'ice", "al\"ice", "tab\tbed"] {
            assert!(validate_username(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_injected_usernames_are_problems() {
        let mut config = valid_config();
        config.server.username = "alice\nPasswordAuthentication yes\nMatch all".to_string();
        config.rdp.username = "bob'; Remove-Item C:\\ -Recurse; '".to_string();

        let problems = config.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("server.username"));
        assert!(problems[1].starts_with("rdp.username"));
        assert!(config.server.validate().is_err());
        assert!(config.rdp.validate().is_err());
    }

    #[test]
    fn test_rdp_debug_hides_password() {
        let rendered = format!("{:?}", valid_config().rdp);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
