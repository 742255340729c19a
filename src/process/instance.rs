use crate::process::output::{forward_lines, OutputHandler};
use crate::process::restart::Backoff;
use crate::process::spawner::{spawn_process, RunAs};
use crate::process::types::{OutputKind, ProcessState};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long output readers may keep draining after the child exited
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// How long to wait for the exit to be observed after SIGKILL
const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_millis(500);

/// Mutable runtime attributes of a process, guarded by its own lock
#[derive(Debug, Default)]
struct RunState {
    state: ProcessState,
    pid: u32,
    started_at: Option<Instant>,
    started_wall: Option<SystemTime>,
    last_alive: Duration,
    last_error: Option<String>,
    tried_count: usize,
    stop_requested: bool,
}

/// One supervised OS process instance
///
/// A `Process` is started and stopped many times over its lifetime. `pid`
/// is non-zero exactly while a child is believed to be running and is
/// reset before the exit notification of [`Process::start`] fires.
pub struct Process {
    name: String,
    command: String,
    args: Vec<String>,
    user: Option<String>,
    group: Option<String>,
    run_as: RunAs,
    backoff: Backoff,
    output: Option<OutputHandler>,
    run: Mutex<RunState>,
    alive: watch::Sender<bool>,
}

impl Process {
    /// Create an idle process; nothing is started
    ///
    /// A `user` that cannot be resolved is logged and the process runs
    /// without the privilege drop.
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        user: Option<String>,
    ) -> Self {
        let name = name.into();
        let user = user.filter(|u| !u.is_empty());

        let run_as = match user.as_deref().map(RunAs::lookup) {
            Some(Ok(run_as)) => run_as,
            Some(Err(e)) => {
                warn!(process = %name, "Running without user switch: {}", e);
                RunAs::default()
            }
            None => RunAs::default(),
        };

        let (alive, _) = watch::channel(false);

        Self {
            name,
            command: command.into(),
            args,
            user,
            group: None,
            run_as,
            backoff: Backoff::default(),
            output: None,
            run: Mutex::new(RunState::default()),
            alive,
        }
    }

    /// Use `backoff` when computing restart delays
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run under `group`, overriding the gid of the user
    ///
    /// A group that cannot be resolved is logged and the gid is left as is.
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group.filter(|g| !g.is_empty());

        if let Some(ref group) = self.group {
            match RunAs::lookup_group(group) {
                Ok(gid) => self.run_as.gid = Some(gid),
                Err(e) => warn!(process = %self.name, "Running without group switch: {}", e),
            }
        }

        self
    }

    /// Route output lines to `handler`; without one output is discarded
    pub fn with_output(mut self, handler: OutputHandler) -> Self {
        self.output = Some(handler);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// PID of the running child, 0 when not running
    pub fn pid(&self) -> u32 {
        self.lock().pid
    }

    pub fn is_running(&self) -> bool {
        self.lock().pid != 0
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    /// Number of start attempts, spawn failures included
    pub fn tried_count(&self) -> usize {
        self.lock().tried_count
    }

    /// Diagnostic from the most recent run, if it ended abnormally
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// How long the most recent finished run stayed alive
    pub fn last_alive_duration(&self) -> Duration {
        self.lock().last_alive
    }

    /// Time alive in the current run, zero when not running
    pub fn alive_time(&self) -> Duration {
        let run = self.lock();
        match (run.pid, run.started_at) {
            (0, _) | (_, None) => Duration::ZERO,
            (_, Some(started)) => started.elapsed(),
        }
    }

    /// Wall-clock start of the current run
    pub fn started_at(&self) -> Option<SystemTime> {
        let run = self.lock();
        if run.pid == 0 {
            None
        } else {
            run.started_wall
        }
    }

    /// Delay to apply before the next start
    pub fn retry_delay(&self) -> Duration {
        self.backoff.retry_delay(self.last_alive_duration())
    }

    /// Launch the child in the background
    ///
    /// The returned receiver yields this process exactly once, after the
    /// child has terminated and its exit was observed. A spawn failure
    /// also resolves it, with `last_error` set and `pid` left at 0.
    pub fn start(self: &Arc<Self>) -> oneshot::Receiver<Arc<Process>> {
        let (tx, rx) = oneshot::channel();

        self.lock().stop_requested = false;

        let process = Arc::clone(self);
        tokio::spawn(async move {
            process.run().await;
            let _ = tx.send(process);
        });

        rx
    }

    async fn run(self: &Arc<Self>) {
        let (mut child, pid, started) = {
            let mut run = self.lock();

            if run.pid != 0 {
                warn!(process = %self.name, pid = run.pid, "Process is already running, start aborted");
                return;
            }

            if run.stop_requested {
                debug!(process = %self.name, "Stop requested before spawn, start aborted");
                return;
            }

            let started = Instant::now();
            run.tried_count += 1;
            run.state = ProcessState::Starting;
            run.last_error = None;
            run.started_at = Some(started);
            run.started_wall = Some(SystemTime::now());

            debug!(process = %self.name, attempt = run.tried_count, "Process starting");

            match spawn_process(&self.command, &self.args, self.run_as, self.output.is_some()) {
                Ok(spawned) => {
                    run.pid = spawned.pid;
                    run.state = ProcessState::Running;
                    self.alive.send_replace(true);
                    (spawned.child, spawned.pid, started)
                }
                Err(e) => {
                    error!(process = %self.name, "Start failed: {}", e);
                    run.last_error = Some(e.to_string());
                    run.last_alive = started.elapsed();
                    run.started_at = None;
                    run.started_wall = None;
                    run.state = ProcessState::Exited;
                    return;
                }
            }
        };

        let readers = self.capture_output(&mut child);

        let failure = match child.wait().await {
            Ok(status) if status.success() => None,
            Ok(status) => {
                warn!(process = %self.name, pid, "Process exited abnormally: {}", status);
                Some(format!("process exited with {}", status))
            }
            Err(e) => {
                warn!(process = %self.name, pid, "Waiting for process failed: {}", e);
                Some(format!("wait failed: {}", e))
            }
        };

        // The child is reaped: its pid may be reused from here on.
        let alive = started.elapsed();
        {
            let mut run = self.lock();
            if failure.is_some() {
                run.last_error = failure;
            }
            run.pid = 0;
            run.last_alive = alive;
            run.started_at = None;
            run.started_wall = None;
            run.state = ProcessState::Exited;
        }
        self.alive.send_replace(false);

        debug!(process = %self.name, "Process stopped, alive {:.4}s", alive.as_secs_f64());

        let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        for reader in readers {
            if tokio::time::timeout_at(deadline, reader).await.is_err() {
                debug!(process = %self.name, "Output still open after exit, reader detached");
            }
        }
    }

    fn capture_output(self: &Arc<Self>, child: &mut Child) -> Vec<JoinHandle<()>> {
        let Some(ref handler) = self.output else {
            return Vec::new();
        };

        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                OutputKind::Stdout,
                stdout,
                Arc::clone(self),
                Arc::clone(handler),
            )));
        }

        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                OutputKind::Stderr,
                stderr,
                Arc::clone(self),
                Arc::clone(handler),
            )));
        }

        readers
    }

    /// Terminate the running child: SIGTERM, then SIGKILL after `grace`
    ///
    /// Returns once the child exited within the grace period, or once
    /// SIGKILL has been sent. A missing child counts as stopped. A start
    /// still in flight is aborted before it spawns.
    pub async fn stop(&self, grace: Duration) {
        let pid = {
            let mut run = self.lock();
            run.stop_requested = true;
            if run.pid == 0 {
                debug!(process = %self.name, "Process is not running, nothing to stop");
                return;
            }
            run.state = ProcessState::Stopping;
            run.pid
        };

        let mut alive = self.alive.subscribe();
        let nix_pid = Pid::from_raw(pid as i32);

        info!(process = %self.name, pid, "Stopping process with SIGTERM");

        if let Err(e) = signal::kill(nix_pid, Signal::SIGTERM) {
            Self::log_signal_failure(&self.name, pid, "SIGTERM", e);
            return;
        }

        if tokio::time::timeout(grace, Self::wait_exit(&mut alive))
            .await
            .is_ok()
        {
            debug!(process = %self.name, pid, "Process exited gracefully");
            return;
        }

        warn!(
            process = %self.name,
            pid,
            "Process did not exit within {:?}, sending SIGKILL",
            grace
        );

        if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
            Self::log_signal_failure(&self.name, pid, "SIGKILL", e);
            return;
        }

        let _ = tokio::time::timeout(KILL_CONFIRM_TIMEOUT, Self::wait_exit(&mut alive)).await;
    }

    async fn wait_exit(alive: &mut watch::Receiver<bool>) {
        let _ = alive.wait_for(|running| !*running).await;
    }

    fn log_signal_failure(name: &str, pid: u32, signal: &str, e: Errno) {
        if e == Errno::ESRCH {
            debug!(process = %name, pid, "Process already gone when sending {}", signal);
        } else {
            warn!(process = %name, pid, "Failed to send {}: {}", signal, e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("user", &self.user)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}
