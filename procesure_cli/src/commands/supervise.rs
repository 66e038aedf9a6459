//! Supervise command - Keep the server and agent running

use anyhow::{Context, Result};
use colored::Colorize;
use procesure_core::{Supervisor, SupervisorEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use super::{error, info, success, warn};
use crate::config::ConfigFile;

fn print_event(event: &SupervisorEvent) {
    match event {
        SupervisorEvent::Started { name, pid } => match pid {
            Some(pid) => success(&format!("{} started (pid {})", name.cyan(), pid)),
            None => success(&format!("{} started", name.cyan())),
        },
        SupervisorEvent::Exited { name, code } => match code {
            Some(code) => warn(&format!("{} exited with code {}", name.cyan(), code)),
            None => warn(&format!("{} was terminated", name.cyan())),
        },
        SupervisorEvent::SpawnFailed { name, message } => {
            error(&format!("Could not start {}: {}", name.cyan(), message));
        }
    }
}

pub async fn run(interval_secs: u64, config_path: Option<PathBuf>) -> Result<()> {
    println!();
    println!("{}", "  PROCESURE SUPERVISOR  ".on_bright_blue().white().bold());
    println!();

    let layout = ConfigFile::locate(config_path)?.load()?.layout;
    for exe in [layout.server_exe(), layout.agent_exe()] {
        if !exe.exists() {
            warn(&format!("{} not found, it will fail to start", exe.display()));
        }
    }

    let supervisor = Supervisor::for_layout(&layout, Duration::from_secs(interval_secs));
    info(&format!(
        "Watching {} every {}s (Ctrl+C to stop)",
        supervisor.names().join(", ").cyan(),
        interval_secs
    ));
    println!();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (event_tx, mut event_rx) = mpsc::channel(32);
    let handle = tokio::spawn(supervisor.run(shutdown_rx, Some(event_tx)));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!();
                info("Shutting down...");
                let _ = shutdown_tx.send(true);
                break;
            }
            event = event_rx.recv() => match event {
                Some(event) => print_event(&event),
                // Supervisor returned on its own
                None => break,
            },
        }
    }

    let report = handle.await.context("Supervisor task failed")??;

    println!();
    for (name, starts) in &report.starts {
        println!("  {} {} started {} time(s)", "•".cyan(), name, starts);
    }
    Ok(())
}
