//! Integration tests for Procesure Core
//!
//! These tests exercise the sshd_config upsert against real files and run the
//! provisioning components together through a recording executor.

use procesure_core::{
    agent::AgentManager,
    config::{AgentConfig, RdpConfig, ServerConfig},
    executor::{CommandOutcome, CommandOutput, CommandSpec, Executor},
    provision::{Component, Installer, ProvisionEvent},
    rdp::RdpManager,
    server::ServerManager,
    sshd_config::{backup_path, upsert_block, UpsertAction},
    InstallLayout,
};
use std::cell::RefCell;
use std::fs;
use tempfile::TempDir;

const KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIM/R5Z4FTnZgjGx8PWgZQmQcvzlbrJuF/4WiZmmLmUVi alice@laptop";

/// Records every command and answers each with a successful, empty output
#[derive(Default)]
struct RecordingExecutor {
    commands: RefCell<Vec<CommandSpec>>,
}

impl Executor for RecordingExecutor {
    fn execute(&self, spec: &CommandSpec) -> CommandOutcome {
        self.commands.borrow_mut().push(spec.clone());
        CommandOutcome::Succeeded(CommandOutput::default())
    }
}

#[test]
fn test_upsert_is_idempotent_on_fresh_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sshd_config");
    let body = ["  AuthorizedKeysFile x\n", "  PasswordAuthentication no\n"];

    upsert_block(&path, "Match User alice\n", &body).unwrap();
    let once = fs::read(&path).unwrap();
    upsert_block(&path, "Match User alice\n", &body).unwrap();
    let twice = fs::read(&path).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_new_header_appears_once_and_keeps_original_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sshd_config");
    let original = "# cfg\nPort 22\nSubsystem sftp sftp-server.exe\nMatch Group admins\n  X yes\n";
    fs::write(&path, original).unwrap();

    let action = upsert_block(&path, "Match User alice", &["  Y no"]).unwrap();
    assert_eq!(action, UpsertAction::Inserted);

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.iter().filter(|l| l.trim() == "Match User alice").count(), 1);

    // original lines survive, in their original relative order
    let mut positions = original
        .lines()
        .map(|line| lines.iter().position(|l| *l == line).unwrap());
    let mut previous = positions.next().unwrap();
    for position in positions {
        assert!(position > previous);
        previous = position;
    }
}

#[test]
fn test_other_users_block_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sshd_config");
    fs::write(
        &path,
        "Port 22\n\nMatch User alice\n  AuthorizedKeysFile a\nMatch User bob\n  AuthorizedKeysFile b\n  AllowTcpForwarding no\n",
    )
    .unwrap();

    let action = upsert_block(&path, "Match User alice\n", &["  AuthorizedKeysFile a2\n"]).unwrap();
    assert_eq!(action, UpsertAction::Replaced);

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.ends_with("Match User bob\n  AuthorizedKeysFile b\n  AllowTcpForwarding no\n"));
    assert!(content.contains("Match User alice\n  AuthorizedKeysFile a2\nMatch User bob\n"));
}

#[test]
fn test_backup_written_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sshd_config");
    let original = "# pristine\r\nPort 22\r\n";
    fs::write(&path, original).unwrap();

    upsert_block(&path, "Match User alice\n", &["  A 1\n"]).unwrap();
    assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), original);

    upsert_block(&path, "Match User alice\n", &["  A 2\n"]).unwrap();
    assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), original);
}

#[test]
fn test_concrete_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sshd_config");
    fs::write(&path, "# cfg\n").unwrap();

    upsert_block(&path, "Match User alice\n", &["  AuthorizedKeysFile x\n"]).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "# cfg\n\nMatch User alice\n  AuthorizedKeysFile x\n"
    );

    upsert_block(&path, "Match User alice\n", &["  AuthorizedKeysFile y\n"]).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "# cfg\n\nMatch User alice\n  AuthorizedKeysFile y\n"
    );
}

#[test]
fn test_full_provisioning_run_continues_past_failures() {
    let temp_dir = TempDir::new().unwrap();
    let layout = InstallLayout::rooted_at(temp_dir.path());
    layout.ensure_roots().unwrap();

    let server_config = ServerConfig {
        username: "alice".to_string(),
        public_key: KEY.to_string(),
        port: 2222,
    };
    let agent_config = AgentConfig {
        address: "1.tcp.example.io:23090".to_string(),
        token: "tok".to_string(),
    };
    let rdp_config = RdpConfig {
        username: "alice".to_string(),
        password: "hunter2".to_string(),
        ..RdpConfig::default()
    };

    let server = ServerManager::new(&server_config, &layout);
    let agent = AgentManager::new(&agent_config, &layout, server_config.port);
    let rdp = RdpManager::new(&rdp_config, &layout);
    let executor = RecordingExecutor::default();

    let mut failed_steps = Vec::new();
    let report = Installer::new(&executor).run(&[&server as &dyn Component, &agent, &rdp], |event| {
        if let ProvisionEvent::StepFailed { step, .. } = event {
            failed_steps.push(*step);
        }
    });

    // binaries are never downloaded, so only the steps that need them fail
    assert_eq!(
        failed_steps,
        vec!["host-keys", "install-service", "configure-service", "binary"]
    );
    assert_eq!(report.failed(), 4);
    assert_eq!(report.succeeded(), report.steps.len() - 4);

    let sshd_config = fs::read_to_string(layout.sshd_config_path()).unwrap();
    assert!(sshd_config.contains("Port 2222\n"));
    assert!(sshd_config.contains("Match User alice\n"));
    assert!(layout.authorized_keys_path("alice").exists());
    assert!(layout.agent_config_path().exists());
    assert_eq!(
        fs::read_to_string(&layout.hosts_file).unwrap(),
        "127.0.0.2 procesure\n"
    );

    let commands = executor.commands.borrow();
    assert!(commands.iter().any(|c| c.program == "icacls"));
    assert!(commands.iter().any(|c| c.program == "cmdkey" && c.redact_args));
    assert!(commands
        .iter()
        .any(|c| c.args.last().is_some_and(|a| a.starts_with("Restart-Service"))));
    assert_eq!(
        commands
            .iter()
            .filter(|c| c.args.last().is_some_and(|a| a.contains("SetEnvironmentVariable")))
            .count(),
        2
    );
}

#[test]
fn test_injected_username_leaves_sshd_config_clean() {
    let temp_dir = TempDir::new().unwrap();
    let layout = InstallLayout::rooted_at(temp_dir.path());
    let config = ServerConfig {
        username: "alice\nPasswordAuthentication yes\nMatch all".to_string(),
        public_key: KEY.to_string(),
        port: 2222,
    };
    let server = ServerManager::new(&config, &layout);
    let executor = RecordingExecutor::default();

    let report = Installer::new(&executor).run(&[&server as &dyn Component], |_| {});
    let failed: Vec<_> = report.failures().map(|f| f.step).collect();
    assert!(failed.contains(&"validate"));
    assert!(failed.contains(&"authorized-keys"));
    assert!(failed.contains(&"sshd-config"));

    let sshd_config = fs::read_to_string(layout.sshd_config_path()).unwrap();
    assert!(!sshd_config.contains("PasswordAuthentication yes"));
    assert!(!sshd_config.contains("Match"));
    assert!(!executor.commands.borrow().iter().any(|c| c.program == "icacls"));
}

#[test]
fn test_second_run_leaves_config_stable() {
    let temp_dir = TempDir::new().unwrap();
    let layout = InstallLayout::rooted_at(temp_dir.path());
    let config = ServerConfig {
        username: "alice".to_string(),
        public_key: KEY.to_string(),
        port: 2200,
    };
    let server = ServerManager::new(&config, &layout);
    let executor = RecordingExecutor::default();
    let components: [&dyn Component; 1] = [&server];

    Installer::new(&executor).run(&components, |_| {});
    let first = fs::read_to_string(layout.sshd_config_path()).unwrap();
    Installer::new(&executor).run(&components, |_| {});
    let second = fs::read_to_string(layout.sshd_config_path()).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        procesure_core::keys::AuthorizedKeys::new(layout.authorized_keys_path("alice"))
            .list()
            .unwrap()
            .len(),
        1
    );
}
