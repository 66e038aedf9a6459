//! Procesure Core Library
//!
//! This crate provides the core functionality for provisioning a Windows
//! host for remote access: a private OpenSSH server, a tunnel agent, RDP,
//! and a supervisor that keeps the server and agent running.
//!
//! # Architecture
//!
//! - [`sshd_config`]: idempotent editing of `sshd_config` (Match blocks, global directives)
//! - [`executor`]: external command execution with structured outcomes
//! - [`provision`]: the best-effort step pipeline
//! - [`server`], [`agent`], [`rdp`]: the provisioning components
//! - [`supervisor`]: keep-alive loop for the installed processes
//!
//! # Example
//!
//! ```no_run
//! use procesure_core::{
//!     config::InstallationConfig,
//!     executor::SystemExecutor,
//!     provision::{Component, Installer},
//!     server::ServerManager,
//! };
//!
//! fn provision(config: &InstallationConfig) {
//!     let server = ServerManager::new(&config.server, &config.layout);
//!     let executor = SystemExecutor::new();
//!
//!     let report = Installer::new(&executor).run(&[&server as &dyn Component], |event| {
//!         println!("{:?}", event);
//!     });
//!     println!("{} step(s) failed", report.failed());
//! }
//! ```

pub mod agent;
pub mod config;
pub mod env_path;
pub mod error;
pub mod executor;
pub mod hosts;
pub mod keys;
pub mod layout;
pub mod provision;
pub mod rdp;
pub mod server;
pub mod sshd_config;
pub mod supervisor;

// Re-export commonly used types
pub use config::{AgentConfig, InstallationConfig, RdpConfig, ServerConfig, DEFAULT_SERVER_PORT};
pub use error::{ProcesureError, Result};
pub use executor::{CommandOutcome, CommandOutput, CommandSpec, Executor, SystemExecutor};
pub use layout::InstallLayout;
pub use provision::{Component, Installer, ProvisionEvent, ProvisionReport};
pub use sshd_config::{upsert_block, UpsertAction};
pub use supervisor::{Supervisor, SupervisorEvent, DEFAULT_CHECK_INTERVAL};

/// Get the version of the procesure_core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
