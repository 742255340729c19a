use std::time::Duration;

/// Runs shorter than this are treated as crash-looping
pub const DEFAULT_MIN_UPTIME: Duration = Duration::from_secs(5);

/// Delay applied before restarting a crash-looping process
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Restart backoff policy shared by every process of a manager
///
/// A process that stayed alive for less than `min_uptime` is restarted
/// after `restart_delay`; one that ran at least that long is restarted
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Liveness threshold separating crash loops from healthy runs
    pub min_uptime: Duration,
    /// Fixed delay for crash-looping processes
    pub restart_delay: Duration,
}

impl Backoff {
    pub fn new(min_uptime: Duration, restart_delay: Duration) -> Self {
        Self {
            min_uptime,
            restart_delay,
        }
    }

    /// Calculate the delay before the next start given how long the last run lasted
    pub fn retry_delay(&self, last_alive: Duration) -> Duration {
        if last_alive < self.min_uptime {
            self.restart_delay
        } else {
            Duration::ZERO
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_UPTIME, DEFAULT_RESTART_DELAY)
    }
}
