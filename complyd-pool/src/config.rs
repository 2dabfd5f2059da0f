use std::time::Duration;

use complyd_core::{DataAccessError, DatabaseSettings};
use serde::{Deserialize, Serialize};

/// TCP keep-alive tuning applied to the non-blocking pool's sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeepaliveConfig {
    pub idle_secs: u64,
    pub interval_secs: u64,
    pub count: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle_secs: 60,
            interval_secs: 10,
            count: 5,
        }
    }
}

/// Configuration for the dual-mode connection pools.
///
/// Immutable once a pool has been built from it. `retry_attempts` and
/// `retry_delay` are carried for callers that implement their own retry
/// loop; the pool manager never retries an acquisition internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Minimum number of connections to maintain in each pool.
    pub min_connections: u32,

    /// Maximum number of regular connections per pool.
    pub max_connections: u32,

    /// Additional connections allowed past `max_connections` under burst
    /// load. Folded into the backing pool's hard cap.
    pub max_overflow: u32,

    /// Timeout for acquiring a connection from the pool.
    pub acquire_timeout: Duration,

    /// Maximum lifetime of a connection before forced turnover.
    pub recycle_after: Duration,

    /// Run a pre-flight liveness check before handing out a connection.
    pub test_before_acquire: bool,

    /// Reserved for caller-level retry.
    pub retry_attempts: u32,

    /// Reserved for caller-level retry.
    pub retry_delay: Duration,

    /// Cadence of the background health monitor.
    pub health_check_interval: Duration,

    /// Keep-alive tuning for the non-blocking pool.
    pub keepalive: KeepaliveConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 5,
            max_connections: 20,
            max_overflow: 10,
            acquire_timeout: Duration::from_secs(30),
            recycle_after: Duration::from_secs(1800), // 30 minutes
            test_before_acquire: true,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
            health_check_interval: Duration::from_secs(60),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

/// Builder for creating PoolConfig instances.
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    min_connections: Option<u32>,
    max_connections: Option<u32>,
    max_overflow: Option<u32>,
    acquire_timeout: Option<Duration>,
    recycle_after: Option<Duration>,
    test_before_acquire: Option<bool>,
    retry_attempts: Option<u32>,
    retry_delay: Option<Duration>,
    health_check_interval: Option<Duration>,
    keepalive: Option<KeepaliveConfig>,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = Some(min);
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn max_overflow(mut self, overflow: u32) -> Self {
        self.max_overflow = Some(overflow);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn recycle_after(mut self, lifetime: Duration) -> Self {
        self.recycle_after = Some(lifetime);
        self
    }

    pub fn test_before_acquire(mut self, enabled: bool) -> Self {
        self.test_before_acquire = Some(enabled);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    pub fn keepalive(mut self, keepalive: KeepaliveConfig) -> Self {
        self.keepalive = Some(keepalive);
        self
    }

    /// Builds the PoolConfig instance.
    ///
    /// # Errors
    ///
    /// Returns `DataAccessError::Configuration` if the bounds are invalid.
    pub fn build(self) -> Result<PoolConfig, DataAccessError> {
        let default = PoolConfig::default();

        let min = self.min_connections.unwrap_or(default.min_connections);
        let max = self.max_connections.unwrap_or(default.max_connections);

        if min > max {
            return Err(DataAccessError::Configuration(format!(
                "min_connections ({}) cannot be greater than max_connections ({})",
                min, max
            )));
        }

        if max == 0 {
            return Err(DataAccessError::Configuration(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        Ok(PoolConfig {
            min_connections: min,
            max_connections: max,
            max_overflow: self.max_overflow.unwrap_or(default.max_overflow),
            acquire_timeout: self.acquire_timeout.unwrap_or(default.acquire_timeout),
            recycle_after: self.recycle_after.unwrap_or(default.recycle_after),
            test_before_acquire: self
                .test_before_acquire
                .unwrap_or(default.test_before_acquire),
            retry_attempts: self.retry_attempts.unwrap_or(default.retry_attempts),
            retry_delay: self.retry_delay.unwrap_or(default.retry_delay),
            health_check_interval: self
                .health_check_interval
                .unwrap_or(default.health_check_interval),
            keepalive: self.keepalive.unwrap_or(default.keepalive),
        })
    }
}

impl PoolConfig {
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Derives a pool configuration from the loaded settings surface.
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        Self {
            min_connections: settings.min_connections,
            max_connections: settings.max_connections,
            max_overflow: settings.max_overflow,
            acquire_timeout: Duration::from_secs(settings.pool_timeout_secs),
            recycle_after: Duration::from_secs(settings.pool_recycle_secs),
            retry_attempts: settings.retry_attempts,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
            ..Default::default()
        }
    }

    /// The hard cap handed to the backing pool: regular connections plus
    /// the overflow allowance.
    pub fn effective_max(&self) -> u32 {
        self.max_connections + self.max_overflow
    }

    /// Configuration tuned for high-fan-out workloads.
    pub fn high_throughput() -> Self {
        Self {
            min_connections: 10,
            max_connections: 50,
            max_overflow: 20,
            acquire_timeout: Duration::from_secs(10),
            recycle_after: Duration::from_secs(1200),
            ..Default::default()
        }
    }

    /// Configuration tuned for development environments.
    pub fn development() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            max_overflow: 0,
            acquire_timeout: Duration::from_secs(60),
            test_before_acquire: false,
            health_check_interval: Duration::from_secs(120),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.effective_max(), 30);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert!(config.test_before_acquire);
    }

    #[test]
    fn builder_basic() {
        let config = PoolConfig::builder()
            .min_connections(10)
            .max_connections(50)
            .max_overflow(5)
            .build()
            .unwrap();

        assert_eq!(config.min_connections, 10);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.effective_max(), 55);
    }

    #[test]
    fn builder_rejects_min_greater_than_max() {
        let result = PoolConfig::builder()
            .min_connections(30)
            .max_connections(20)
            .build();

        assert!(matches!(
            result.unwrap_err(),
            DataAccessError::Configuration(_)
        ));
    }

    #[test]
    fn builder_rejects_zero_max() {
        let result = PoolConfig::builder()
            .min_connections(0)
            .max_connections(0)
            .build();

        assert!(matches!(
            result.unwrap_err(),
            DataAccessError::Configuration(_)
        ));
    }

    #[test]
    fn from_settings_maps_durations() {
        let mut settings = DatabaseSettings::default();
        settings.pool_timeout_secs = 1;
        settings.retry_delay_ms = 250;

        let config = PoolConfig::from_settings(&settings);
        assert_eq!(config.acquire_timeout, Duration::from_secs(1));
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.max_connections, settings.max_connections);
    }
}
