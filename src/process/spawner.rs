use crate::error::{HerderError, Result};
use nix::unistd::{Group, User};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Identity a child is started under; unset ids are inherited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunAs {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl RunAs {
    /// Resolve a user name to its uid and primary gid
    pub fn lookup(user: &str) -> Result<Self> {
        match User::from_name(user) {
            Ok(Some(found)) => Ok(Self {
                uid: Some(found.uid.as_raw()),
                gid: Some(found.gid.as_raw()),
            }),
            Ok(None) => Err(HerderError::UserLookup(format!("unknown user {}", user))),
            Err(e) => Err(HerderError::UserLookup(format!(
                "lookup of user {} failed: {}",
                user, e
            ))),
        }
    }

    /// Resolve a group name to its gid
    pub fn lookup_group(group: &str) -> Result<u32> {
        match Group::from_name(group) {
            Ok(Some(found)) => Ok(found.gid.as_raw()),
            Ok(None) => Err(HerderError::UserLookup(format!("unknown group {}", group))),
            Err(e) => Err(HerderError::UserLookup(format!(
                "lookup of group {} failed: {}",
                group, e
            ))),
        }
    }

    pub fn is_inherited(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }
}

/// Handle returned when spawning a process
#[derive(Debug)]
pub struct SpawnedProcess {
    /// The child process handle
    pub child: Child,

    /// Process ID assigned by the OS
    pub pid: u32,
}

/// Spawn `command` with `args`
///
/// Stdout and stderr are piped when `capture` is set and discarded
/// otherwise. The child stays in the supervisor's process group.
pub fn spawn_process(
    command: &str,
    args: &[String],
    run_as: RunAs,
    capture: bool,
) -> Result<SpawnedProcess> {
    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd.stdin(Stdio::null());

    if capture {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
    }

    if let Some(uid) = run_as.uid {
        cmd.uid(uid);
    }
    if let Some(gid) = run_as.gid {
        cmd.gid(gid);
    }

    let child = cmd
        .spawn()
        .map_err(|e| HerderError::SpawnError(format!("{}: {}", command, e)))?;

    let pid = child
        .id()
        .ok_or_else(|| HerderError::SpawnError(format!("{}: no pid assigned", command)))?;

    Ok(SpawnedProcess { child, pid })
}
