//! Engine configuration
//!
//! Sweep cadence, runner parallelism, the step retry budget and render
//! polling limits.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the wake sweeper scans for due instances
    pub sweep_interval: Duration,

    /// Maximum number of instances claimed per sweep
    pub sweep_batch_size: usize,

    /// Maximum number of instances running at the same time
    pub max_parallel_jobs: usize,

    /// Attempts per step, including the first one
    pub step_max_attempts: u32,

    pub step_initial_backoff: Duration,

    pub step_max_backoff: Duration,

    /// Upper bound for a single collaborator call
    pub step_timeout: Duration,

    /// Wait between two render progress polls
    pub render_poll_interval: Duration,

    /// Polls before a render is given up
    pub render_max_polls: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5),
            sweep_batch_size: 100,
            max_parallel_jobs: 16,
            step_max_attempts: 3,
            step_initial_backoff: Duration::from_millis(500),
            step_max_backoff: Duration::from_millis(30_000),
            step_timeout: Duration::from_secs(120),
            render_poll_interval: Duration::from_secs(5),
            render_max_polls: 720,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - SWEEP_INTERVAL (seconds, default: 5)
    /// - SWEEP_BATCH_SIZE (default: 100)
    /// - MAX_PARALLEL_JOBS (default: 16)
    /// - STEP_MAX_ATTEMPTS (default: 3)
    /// - STEP_INITIAL_BACKOFF_MS (default: 500)
    /// - STEP_MAX_BACKOFF_MS (default: 30000)
    /// - STEP_TIMEOUT (seconds, default: 120)
    /// - RENDER_POLL_INTERVAL (seconds, default: 5)
    /// - RENDER_MAX_POLLS (default: 720)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            sweep_interval: env_parse::<u64>("SWEEP_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            sweep_batch_size: env_parse("SWEEP_BATCH_SIZE").unwrap_or(defaults.sweep_batch_size),
            max_parallel_jobs: env_parse("MAX_PARALLEL_JOBS").unwrap_or(defaults.max_parallel_jobs),
            step_max_attempts: env_parse("STEP_MAX_ATTEMPTS").unwrap_or(defaults.step_max_attempts),
            step_initial_backoff: env_parse::<u64>("STEP_INITIAL_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_initial_backoff),
            step_max_backoff: env_parse::<u64>("STEP_MAX_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_max_backoff),
            step_timeout: env_parse::<u64>("STEP_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.step_timeout),
            render_poll_interval: env_parse::<u64>("RENDER_POLL_INTERVAL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.render_poll_interval),
            render_max_polls: env_parse("RENDER_MAX_POLLS").unwrap_or(defaults.render_max_polls),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sweep_interval.is_zero() {
            anyhow::bail!("sweep_interval must be greater than 0");
        }

        if self.sweep_batch_size == 0 {
            anyhow::bail!("sweep_batch_size must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.step_max_attempts == 0 {
            anyhow::bail!("step_max_attempts must be at least 1");
        }

        if self.step_initial_backoff > self.step_max_backoff {
            anyhow::bail!("step_initial_backoff cannot exceed step_max_backoff");
        }

        if self.step_timeout.is_zero() {
            anyhow::bail!("step_timeout must be greater than 0");
        }

        if self.render_max_polls == 0 {
            anyhow::bail!("render_max_polls must be greater than 0");
        }

        Ok(())
    }

    /// Retry policy applied to every step
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.step_max_attempts,
            initial_delay: self.step_initial_backoff,
            max_delay: self.step_max_backoff,
            timeout: self.step_timeout,
        }
    }

    /// Retry policy for a render poll, whose body also waits out the interval
    pub fn render_poll_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.step_timeout + self.render_poll_interval,
            ..self.retry_policy()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.max_parallel_jobs, 16);
        assert_eq!(config.render_max_polls, 720);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.max_parallel_jobs = 0;
        assert!(config.validate().is_err());
        config.max_parallel_jobs = 4;

        config.step_initial_backoff = Duration::from_secs(60);
        assert!(config.validate().is_err());
        config.step_initial_backoff = Duration::from_millis(100);

        config.step_max_attempts = 0;
        assert!(config.validate().is_err());
        config.step_max_attempts = 1;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_policy_mirrors_config() {
        let config = EngineConfig {
            step_max_attempts: 5,
            step_timeout: Duration::from_secs(10),
            render_poll_interval: Duration::from_secs(3),
            ..Default::default()
        };

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.timeout, Duration::from_secs(10));
        assert_eq!(config.render_poll_policy().timeout, Duration::from_secs(13));
    }
}
