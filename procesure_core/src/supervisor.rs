//! Keep-alive supervisor for the server and agent processes
//!
//! Runs on a fixed tick. On every tick each watched process that is not
//! running (never started, or exited since the last tick) is spawned again.

use crate::error::{ProcesureError, Result};
use crate::executor::CommandSpec;
use crate::layout::InstallLayout;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Default interval between liveness checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Events emitted by the supervisor loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Started { name: String, pid: Option<u32> },
    Exited { name: String, code: Option<i32> },
    SpawnFailed { name: String, message: String },
}

/// How many times each process was started during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub starts: BTreeMap<String, u32>,
}

impl SupervisorReport {
    pub fn starts(&self, name: &str) -> u32 {
        self.starts.get(name).copied().unwrap_or(0)
    }
}

struct Slot {
    name: String,
    spec: CommandSpec,
    child: Option<Child>,
    starts: u32,
}

pub struct Supervisor {
    interval: Duration,
    processes: Vec<(String, CommandSpec)>,
}

impl Supervisor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            processes: Vec::new(),
        }
    }

    /// Supervise the Procesure sshd and tunnel agent of an install
    pub fn for_layout(layout: &InstallLayout, interval: Duration) -> Self {
        let server = CommandSpec::new(layout.server_exe().to_string_lossy())
            .arg("-f")
            .arg_path(&layout.sshd_config_path())
            .dir(layout.server_dir());
        let agent = CommandSpec::new(layout.agent_exe().to_string_lossy())
            .args(["start", "--all", "--config"])
            .arg_path(&layout.agent_config_path())
            .dir(&layout.program_files);

        Self::new(interval).watch("server", server).watch("agent", agent)
    }

    pub fn watch(mut self, name: impl Into<String>, spec: CommandSpec) -> Self {
        self.processes.push((name.into(), spec));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.processes.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run until `shutdown` becomes true (or its sender is dropped).
    ///
    /// Children are killed on the way out.
    pub async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        events: Option<mpsc::Sender<SupervisorEvent>>,
    ) -> Result<SupervisorReport> {
        if self.processes.is_empty() {
            return Err(ProcesureError::Supervisor(
                "no processes to supervise".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(ProcesureError::Supervisor(
                "check interval must be greater than zero".to_string(),
            ));
        }

        let mut slots: Vec<Slot> = self
            .processes
            .into_iter()
            .map(|(name, spec)| Slot {
                name,
                spec,
                child: None,
                starts: 0,
            })
            .collect();

        info!("Supervisor started, checking every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    for slot in slots.iter_mut() {
                        check_slot(slot, &events);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Supervisor stopping");
        let mut report = SupervisorReport::default();
        for mut slot in slots {
            if let Some(child) = slot.child.as_mut() {
                if let Err(e) = child.kill().await {
                    debug!("Could not kill {}: {}", slot.name, e);
                }
            }
            report.starts.insert(slot.name, slot.starts);
        }
        Ok(report)
    }
}

/// Never blocks the loop: events are dropped when the listener lags or is gone
fn emit(events: &Option<mpsc::Sender<SupervisorEvent>>, event: SupervisorEvent) {
    if let Some(tx) = events {
        if let Err(e) = tx.try_send(event) {
            debug!("Supervisor event dropped: {}", e);
        }
    }
}

fn check_slot(slot: &mut Slot, events: &Option<mpsc::Sender<SupervisorEvent>>) {
    if let Some(child) = slot.child.as_mut() {
        match child.try_wait() {
            Ok(None) => return,
            Ok(Some(status)) => {
                warn!("{} exited with {}", slot.name, status);
                emit(
                    events,
                    SupervisorEvent::Exited {
                        name: slot.name.clone(),
                        code: status.code(),
                    },
                );
            }
            Err(e) => warn!("Could not poll {}: {}", slot.name, e),
        }
        slot.child = None;
    }

    let mut cmd = Command::new(&slot.spec.program);
    cmd.args(&slot.spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = &slot.spec.current_dir {
        cmd.current_dir(dir);
    }

    match cmd.spawn() {
        Ok(child) => {
            let pid = child.id();
            slot.starts += 1;
            slot.child = Some(child);
            info!("Started {} ({})", slot.name, slot.spec);
            emit(
                events,
                SupervisorEvent::Started {
                    name: slot.name.clone(),
                    pid,
                },
            );
        }
        Err(e) => {
            warn!("Failed to start {}: {}", slot.name, e);
            emit(
                events,
                SupervisorEvent::SpawnFailed {
                    name: slot.name.clone(),
                    message: e.to_string(),
                },
            );
        }
    }
}
