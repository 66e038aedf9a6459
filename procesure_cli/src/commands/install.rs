//! Install command - Provision the server, agent and RDP components

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use procesure_core::{
    agent::AgentManager, rdp::RdpManager, server::ServerManager, Component, InstallationConfig,
    Installer, ProvisionEvent, ProvisionReport, SystemExecutor,
};
use std::path::PathBuf;
use std::time::Duration;

use super::{error, info, success, warn};
use crate::config::ConfigFile;

/// Installable component
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ComponentKind {
    Server,
    Agent,
    Rdp,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Server,
        ComponentKind::Agent,
        ComponentKind::Rdp,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ComponentKind::Server => "server",
            ComponentKind::Agent => "agent",
            ComponentKind::Rdp => "rdp",
        }
    }
}

/// Components to install, in pipeline order. An empty selection means all of them.
pub fn selected(only: &[ComponentKind]) -> Vec<ComponentKind> {
    ComponentKind::ALL
        .into_iter()
        .filter(|kind| only.is_empty() || only.contains(kind))
        .collect()
}

pub async fn run(config_path: Option<PathBuf>, only: Vec<ComponentKind>, yes: bool) -> Result<()> {
    println!();
    println!("{}", "  PROCESURE INSTALLER  ".on_bright_blue().white().bold());
    println!();

    let file = ConfigFile::locate(config_path)?;
    if !file.exists() {
        warn(&format!(
            "No config at {}, using defaults",
            file.path().display().to_string().cyan()
        ));
    }
    let config = file.load()?;

    let kinds = selected(&only);
    let labels: Vec<_> = kinds.iter().map(|k| k.label()).collect();
    info(&format!("Components: {}", labels.join(", ").cyan()));

    let problems = config.problems();
    if !problems.is_empty() {
        warn("The configuration has problems; the affected steps will fail:");
        for problem in &problems {
            println!("  {} {}", "•".yellow(), problem);
        }
    }
    println!();

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Provision this machine now?")
            .default(false)
            .interact()?;

        if !confirmed {
            info("Installation cancelled.");
            return Ok(());
        }
    }

    config
        .layout
        .ensure_roots()
        .context("Failed to create the install directories")?;

    let report = provision(&config, &kinds)?;
    print_summary(&report);

    if report.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{} step(s) failed", report.failed()))
    }
}

fn provision(config: &InstallationConfig, kinds: &[ComponentKind]) -> Result<ProvisionReport> {
    let server = ServerManager::new(&config.server, &config.layout);
    let agent = AgentManager::new(&config.agent, &config.layout, config.server.port);
    let rdp = RdpManager::new(&config.rdp, &config.layout);

    let mut components: Vec<&dyn Component> = Vec::new();
    for kind in kinds {
        match kind {
            ComponentKind::Server => components.push(&server),
            ComponentKind::Agent => components.push(&agent),
            ComponentKind::Rdp => components.push(&rdp),
        }
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(80));

    let executor = SystemExecutor::new();
    let report = Installer::new(&executor).run(&components, |event| match event {
        ProvisionEvent::StepStarted { component, step } => {
            spinner.set_message(format!("{} {}...", component, step));
        }
        ProvisionEvent::StepFinished { component, step } => {
            spinner.println(format!("{} {}/{}", "✓".green().bold(), component, step));
        }
        ProvisionEvent::StepFailed {
            component,
            step,
            message,
        } => {
            spinner.println(format!(
                "{} {}/{}: {}",
                "✗".red().bold(),
                component,
                step,
                message.dimmed()
            ));
        }
    });

    spinner.finish_and_clear();
    Ok(report)
}

fn print_summary(report: &ProvisionReport) {
    println!();
    if report.is_success() {
        success(&format!("All {} steps completed", report.succeeded()));
        return;
    }

    error(&format!(
        "{} of {} steps failed",
        report.failed(),
        report.steps.len()
    ));
    for failure in report.failures() {
        println!(
            "  {} {}/{}: {}",
            "•".red(),
            failure.component.cyan(),
            failure.step,
            failure.error.as_deref().unwrap_or_default()
        );
    }
    println!();
    println!("{}", "Fix the problems above and run the installer again.".dimmed());
}
