use crate::error::{HerderError, Result};
use crate::process::restart::{Backoff, DEFAULT_MIN_UPTIME, DEFAULT_RESTART_DELAY};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Upper bound on replicas per program
pub const MAX_INSTANCES: usize = 100;

/// Supervisor settings plus the programs to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Grace period between SIGTERM and SIGKILL (in seconds)
    #[serde(default = "default_close_timeout")]
    pub close_timeout_secs: u64,

    /// Restart backoff shared by all processes
    #[serde(default)]
    pub restart: RestartConfig,

    #[serde(default)]
    pub programs: Vec<ProgramConfig>,
}

/// Backoff settings for crash-looping processes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartConfig {
    /// Runs shorter than this count as a crash (in milliseconds)
    #[serde(default = "default_min_uptime")]
    pub min_uptime_ms: u64,

    /// Delay before restarting a crashed process (in milliseconds)
    #[serde(default = "default_restart_delay")]
    pub restart_delay_ms: u64,
}

/// One program definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Program name (unique identifier)
    pub name: String,

    /// Raw command line, split on whitespace
    pub command: String,

    /// Number of replicas to run
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// User to run the replicas as
    #[serde(default)]
    pub user: Option<String>,

    /// Group to run the replicas as, overriding the user's group
    #[serde(default)]
    pub group: Option<String>,
}

// Default value functions for serde
fn default_close_timeout() -> u64 {
    10
}

fn default_min_uptime() -> u64 {
    DEFAULT_MIN_UPTIME.as_millis() as u64
}

fn default_restart_delay() -> u64 {
    DEFAULT_RESTART_DELAY.as_millis() as u64
}

fn default_instances() -> usize {
    1
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            close_timeout_secs: default_close_timeout(),
            restart: RestartConfig::default(),
            programs: Vec::new(),
        }
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            min_uptime_ms: default_min_uptime(),
            restart_delay_ms: default_restart_delay(),
        }
    }
}

impl ManagerConfig {
    /// Validate the configuration and every program in it
    pub fn validate(&self) -> Result<()> {
        if self.close_timeout_secs == 0 {
            return Err(HerderError::ConfigValidationError(
                "close_timeout_secs must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for program in &self.programs {
            program.validate()?;
            if !seen.insert(program.name.as_str()) {
                return Err(HerderError::ConfigValidationError(format!(
                    "Duplicate program name: {}",
                    program.name
                )));
            }
        }

        Ok(())
    }

    /// Get close timeout as Duration
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl RestartConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.min_uptime_ms),
            Duration::from_millis(self.restart_delay_ms),
        )
    }
}

impl ProgramConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(HerderError::ConfigValidationError(
                "Program name must not be empty".to_string(),
            ));
        }

        if self.command.trim().is_empty() {
            return Err(HerderError::ConfigValidationError(format!(
                "Program {} has an empty command",
                self.name
            )));
        }

        if self.instances == 0 {
            return Err(HerderError::ConfigValidationError(
                "instances must be at least 1".to_string(),
            ));
        }

        if self.instances > MAX_INSTANCES {
            return Err(HerderError::ConfigValidationError(format!(
                "instances cannot exceed {}",
                MAX_INSTANCES
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(name: &str, command: &str, instances: usize) -> ProgramConfig {
        ProgramConfig {
            name: name.to_string(),
            command: command.to_string(),
            instances,
            user: None,
            group: None,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.close_timeout(), Duration::from_secs(10));
        assert_eq!(config.restart.backoff(), Backoff::default());
        assert!(config.programs.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_json_with_defaults() {
        let json = r#"
            {
                "programs": [
                    { "name": "web", "command": "/usr/bin/python -m http.server" },
                    { "name": "worker", "command": "/bin/sleep 60", "instances": 4, "user": "nobody", "group": "nogroup" }
                ]
            }
        "#;

        let config: ManagerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.close_timeout_secs, 10);
        assert_eq!(config.restart.restart_delay_ms, 5000);
        assert_eq!(config.programs[0].instances, 1);
        assert_eq!(config.programs[1].instances, 4);
        assert_eq!(config.programs[1].user.as_deref(), Some("nobody"));
        assert_eq!(config.programs[1].group.as_deref(), Some("nogroup"));
        assert_eq!(config.programs[0].group, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_close_timeout() {
        let config = ManagerConfig {
            close_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HerderError::ConfigValidationError(_))
        ));
    }

    #[test]
    fn test_validate_programs() {
        assert!(program("", "/bin/true", 1).validate().is_err());
        assert!(program("x", "   ", 1).validate().is_err());
        assert!(program("x", "/bin/true", 0).validate().is_err());
        assert!(program("x", "/bin/true", MAX_INSTANCES + 1).validate().is_err());
        assert!(program("x", "/bin/true", MAX_INSTANCES).validate().is_ok());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let config = ManagerConfig {
            programs: vec![program("same", "/bin/true", 1), program("same", "/bin/false", 1)],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HerderError::ConfigValidationError(_))
        ));
    }
}
