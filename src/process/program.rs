use crate::error::{HerderError, Result};
use crate::process::inspection::{Inspection, Inspector};
use crate::process::output::OutputHandler;
use crate::process::restart::Backoff;
use crate::process::Process;
use std::sync::Arc;

/// A named service running a fixed number of replicas of one command
#[derive(Debug)]
pub struct Program {
    name: String,
    command: String,
    user: Option<String>,
    group: Option<String>,
    replicas: usize,
    processes: Vec<Arc<Process>>,
}

impl Program {
    /// Describe a program; no process is created until [`Program::prepare`]
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        user: Option<String>,
        replicas: usize,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            user: user.filter(|u| !u.is_empty()),
            group: None,
            replicas,
            processes: Vec::new(),
        }
    }

    /// Run every replica under `group`; an empty name means none
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group.filter(|g| !g.is_empty());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Split the raw command line into executable and arguments
    ///
    /// Tokens are separated by whitespace only; quotes and escapes are
    /// passed through literally.
    pub fn split_command(&self) -> Result<(String, Vec<String>)> {
        let mut parts = self.command.split_whitespace().map(str::to_string);
        let executable = parts.next().ok_or_else(|| {
            HerderError::InvalidProgram(format!("program {} has an empty command", self.name))
        })?;
        Ok((executable, parts.collect()))
    }

    /// Create `replicas` processes named `<program>/<index>`
    ///
    /// Calling it again appends another set, continuing the index.
    pub fn prepare(&mut self, backoff: Backoff, output: Option<OutputHandler>) -> Result<()> {
        let (executable, args) = self.split_command()?;
        let first = self.processes.len();

        for index in first..first + self.replicas {
            let mut process = Process::new(
                format!("{}/{}", self.name, index),
                executable.clone(),
                args.clone(),
                self.user.clone(),
            )
            .with_group(self.group.clone())
            .with_backoff(backoff);

            if let Some(ref handler) = output {
                process = process.with_output(Arc::clone(handler));
            }

            self.processes.push(Arc::new(process));
        }

        Ok(())
    }

    /// Owned process instances in replica order
    pub fn processes(&self) -> &[Arc<Process>] {
        &self.processes
    }

    pub fn inspections(&self) -> Vec<Inspection> {
        let mut inspector = Inspector::new();
        self.inspect_with(&mut inspector)
    }

    pub(crate) fn inspect_with(&self, inspector: &mut Inspector) -> Vec<Inspection> {
        self.processes
            .iter()
            .map(|process| inspector.inspect(process))
            .collect()
    }
}
