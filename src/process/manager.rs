use crate::config::ManagerConfig;
use crate::error::{HerderError, Result};
use crate::process::inspection::{Inspection, Inspector};
use crate::process::output::OutputHandler;
use crate::process::program::Program;
use crate::process::restart::Backoff;
use crate::process::Process;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Supervises every replica of a fixed set of programs
///
/// Programs are registered with [`Manager::add_program`] before
/// [`Manager::watch`] runs. `watch` starts every process, restarts each one
/// after it exits (delayed by its backoff) and, once cancelled, stops the
/// whole fleet with the close timeout.
pub struct Manager {
    close_timeout: Duration,
    backoff: Backoff,
    output: Option<OutputHandler>,
    programs: HashMap<String, Program>,
    watched: AtomicBool,
}

impl Manager {
    pub fn new(close_timeout: Duration, output: Option<OutputHandler>) -> Self {
        Self {
            close_timeout,
            backoff: Backoff::default(),
            output,
            programs: HashMap::new(),
            watched: AtomicBool::new(false),
        }
    }

    /// Override the restart backoff; applies to programs added afterwards
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Build a manager and register every program of `config`
    pub fn from_config(config: &ManagerConfig, output: Option<OutputHandler>) -> Result<Self> {
        config.validate()?;

        let mut manager =
            Self::new(config.close_timeout(), output).with_backoff(config.restart.backoff());

        for program in &config.programs {
            manager.add_program_as(
                &program.name,
                &program.command,
                program.instances,
                program.user.as_deref().unwrap_or_default(),
                program.group.as_deref().unwrap_or_default(),
            )?;
        }

        Ok(manager)
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Register and prepare a program; `user` may be empty
    ///
    /// Fails once [`Manager::watch`] has been called, when the name is
    /// taken, or when the definition is unusable.
    pub fn add_program(
        &mut self,
        name: &str,
        command: &str,
        replicas: usize,
        user: &str,
    ) -> Result<()> {
        self.add_program_as(name, command, replicas, user, "")
    }

    /// [`Manager::add_program`] with a run-as group; `group` may be empty
    pub fn add_program_as(
        &mut self,
        name: &str,
        command: &str,
        replicas: usize,
        user: &str,
        group: &str,
    ) -> Result<()> {
        if self.watched.load(Ordering::SeqCst) {
            return Err(HerderError::WatchStarted);
        }

        if name.is_empty() {
            return Err(HerderError::InvalidProgram(
                "program name must not be empty".to_string(),
            ));
        }

        if replicas == 0 {
            return Err(HerderError::InvalidProgram(format!(
                "program {} must run at least one replica",
                name
            )));
        }

        if self.programs.contains_key(name) {
            return Err(HerderError::ProgramAlreadyExists(name.to_string()));
        }

        let mut program = Program::new(name, command, Some(user.to_string()), replicas)
            .with_group(Some(group.to_string()));
        program.prepare(self.backoff, self.output.clone())?;

        debug!(program = %name, replicas, "Program added");
        self.programs.insert(name.to_string(), program);

        Ok(())
    }

    /// Stop every replica of `name` and drop the program
    pub async fn remove_program(&mut self, name: &str) -> Result<Program> {
        let program = self
            .programs
            .remove(name)
            .ok_or_else(|| HerderError::ProgramNotFound(name.to_string()))?;

        Self::stop_all(program.processes().iter().cloned(), self.close_timeout).await;
        info!(program = %name, "Program removed");

        Ok(program)
    }

    /// Stop every replica of `name`; an active watch starts them again
    pub async fn restart_program(&self, name: &str) -> Result<()> {
        let program = self
            .programs
            .get(name)
            .ok_or_else(|| HerderError::ProgramNotFound(name.to_string()))?;

        info!(program = %name, "Restarting program");
        Self::stop_all(program.processes().iter().cloned(), self.close_timeout).await;

        Ok(())
    }

    pub fn programs(&self) -> &HashMap<String, Program> {
        &self.programs
    }

    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    /// Every process across every program
    pub fn processes(&self) -> impl Iterator<Item = &Arc<Process>> {
        self.programs
            .values()
            .flat_map(|program| program.processes().iter())
    }

    /// Snapshots of every process, sorted by process name
    pub fn inspections(&self) -> Vec<Inspection> {
        let mut inspector = Inspector::new();
        let mut inspections: Vec<Inspection> = self
            .programs
            .values()
            .flat_map(|program| program.inspect_with(&mut inspector))
            .collect();
        inspections.sort_by(|a, b| a.name.cmp(&b.name));
        inspections
    }

    /// Supervise all processes until `cancel` fires, then stop them
    ///
    /// Each process runs in its own task; its exit comes back to this loop,
    /// which schedules the restart after [`Process::retry_delay`]. On
    /// cancellation pending restarts are aborted before any process is
    /// signalled. Returns once every stop call has completed. Only the
    /// first call supervises; later calls return immediately.
    pub async fn watch(&self, cancel: CancellationToken) {
        if self.watched.swap(true, Ordering::SeqCst) {
            warn!("Manager is already being watched, ignoring");
            return;
        }

        let processes: Vec<Arc<Process>> = self.processes().cloned().collect();

        info!(
            "Supervising {} process(es) across {} program(s)",
            processes.len(),
            self.programs.len()
        );

        let mut runs: JoinSet<Arc<Process>> = JoinSet::new();
        for process in &processes {
            runs.spawn(Self::supervise(Arc::clone(process), Duration::ZERO));
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(joined) = runs.join_next() => match joined {
                    Ok(process) => {
                        let delay = process.retry_delay();
                        match process.last_error() {
                            Some(e) => warn!(
                                process = %process.name(),
                                "Process exited ({}), restarting in {:?}",
                                e,
                                delay
                            ),
                            None => debug!(
                                process = %process.name(),
                                "Process exited, restarting in {:?}",
                                delay
                            ),
                        }
                        runs.spawn(Self::supervise(process, delay));
                    }
                    Err(e) => error!("Supervision task failed: {}", e),
                },
            }
        }

        info!("Shutdown requested, stopping all processes");

        // Pending restarts must be gone before anything is signalled.
        runs.shutdown().await;

        Self::stop_all(processes.into_iter(), self.close_timeout).await;

        info!("All processes stopped");
    }

    /// One run of `process`, optionally delayed; yields it back on exit
    async fn supervise(process: Arc<Process>, delay: Duration) -> Arc<Process> {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let exited = process.start();
        exited.await.unwrap_or(process)
    }

    async fn stop_all(processes: impl Iterator<Item = Arc<Process>>, timeout: Duration) {
        let mut stops = JoinSet::new();
        for process in processes {
            stops.spawn(async move { process.stop(timeout).await });
        }

        while let Some(joined) = stops.join_next().await {
            if let Err(e) = joined {
                error!("Stop task failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("close_timeout", &self.close_timeout)
            .field("backoff", &self.backoff)
            .field("programs", &self.programs)
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
