//! Best-effort provisioning pipeline
//!
//! A provisioning run is a flat list of named steps grouped by component
//! (server, agent, rdp). Steps run in order; a failing step is logged and
//! recorded, and the run moves on to the next one. Nothing is rolled back.

use crate::error::Result;
use crate::executor::Executor;
use tracing::{info, warn};

type StepFn<'a> = Box<dyn Fn(&dyn Executor) -> Result<()> + 'a>;

/// A single named provisioning action
pub struct Step<'a> {
    name: &'static str,
    run: StepFn<'a>,
}

impl<'a> Step<'a> {
    pub fn new<F>(name: &'static str, run: F) -> Self
    where
        F: Fn(&dyn Executor) -> Result<()> + 'a,
    {
        Self {
            name,
            run: Box::new(run),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn run(&self, executor: &dyn Executor) -> Result<()> {
        (self.run)(executor)
    }
}

/// Something that can be installed as a sequence of steps
pub trait Component {
    fn name(&self) -> &'static str;
    fn steps(&self) -> Vec<Step<'_>>;
}

/// Progress notifications emitted while a run is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionEvent {
    StepStarted {
        component: &'static str,
        step: &'static str,
    },
    StepFinished {
        component: &'static str,
        step: &'static str,
    },
    StepFailed {
        component: &'static str,
        step: &'static str,
        message: String,
    },
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub component: &'static str,
    pub step: &'static str,
    /// Error message when the step failed
    pub error: Option<String>,
}

impl StepReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub steps: Vec<StepReport>,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> usize {
        self.steps.iter().filter(|s| s.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.steps.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| !s.is_success())
    }
}

/// Runs components against an executor
pub struct Installer<'e> {
    executor: &'e dyn Executor,
}

impl<'e> Installer<'e> {
    pub fn new(executor: &'e dyn Executor) -> Self {
        Self { executor }
    }

    /// Run every step of every component, in order, reporting progress to `on_event`
    pub fn run<F>(&self, components: &[&dyn Component], mut on_event: F) -> ProvisionReport
    where
        F: FnMut(&ProvisionEvent),
    {
        let mut report = ProvisionReport::default();

        for component in components {
            let name = component.name();
            info!("Provisioning {}", name);

            for step in component.steps() {
                on_event(&ProvisionEvent::StepStarted {
                    component: name,
                    step: step.name(),
                });

                let error = match step.run(self.executor) {
                    Ok(()) => {
                        on_event(&ProvisionEvent::StepFinished {
                            component: name,
                            step: step.name(),
                        });
                        None
                    }
                    Err(e) => {
                        warn!("{}/{} failed: {}", name, step.name(), e);
                        on_event(&ProvisionEvent::StepFailed {
                            component: name,
                            step: step.name(),
                            message: e.to_string(),
                        });
                        Some(e.to_string())
                    }
                };

                report.steps.push(StepReport {
                    component: name,
                    step: step.name(),
                    error,
                });
            }
        }

        info!(
            "Provisioning finished: {} step(s) succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        report
    }
}
