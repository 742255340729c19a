use crate::process::types::ProcessState;
use crate::process::Process;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, Users};

/// Point-in-time view of a process for reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub name: String,
    pub command: String,
    pub args: String,
    pub pid: u32,
    pub is_running: bool,
    pub state: ProcessState,
    /// Seconds alive in the current run, 0 when not running
    pub alive_secs: f64,
    /// Status reported by the OS, empty when unknown
    pub status: String,
    pub tried_count: usize,
    /// Effective user from the OS, falling back to the configured one
    pub user: String,
    /// Creation time of the running child as reported by the OS
    pub uptime: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

impl Inspection {
    /// Snapshot `process`, querying the OS for status details
    pub fn new(process: &Process) -> Self {
        Inspector::new().inspect(process)
    }
}

/// Reuses one system handle across many snapshots
pub struct Inspector {
    system: System,
    users: Users,
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }

    /// Build a snapshot; details the OS cannot provide stay at their defaults
    pub fn inspect(&mut self, process: &Process) -> Inspection {
        let pid = process.pid();

        let mut inspection = Inspection {
            name: process.name().to_string(),
            command: process.command().to_string(),
            args: process.args().join(" "),
            pid,
            is_running: pid != 0,
            state: process.state(),
            alive_secs: process.alive_time().as_secs_f64(),
            status: String::new(),
            tried_count: process.tried_count(),
            user: process.user().unwrap_or_default().to_string(),
            uptime: None,
            last_error: process.last_error(),
        };

        if pid == 0 {
            return inspection;
        }

        let sys_pid = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );

        if let Some(sys_process) = self.system.process(sys_pid) {
            inspection.status = sys_process.status().to_string();

            inspection.uptime = DateTime::from_timestamp(sys_process.start_time() as i64, 0)
                .map(|created| created.with_timezone(&Local));

            if let Some(user) = sys_process
                .user_id()
                .and_then(|uid| self.users.get_user_by_id(uid))
            {
                inspection.user = user.name().to_string();
            }
        }

        inspection
    }
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}
