use std::time::Duration;

/// Connection acquisition settings: gate capacity and retry, pool lifetimes.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Concurrent scopes admitted by the gate; also the pool's connection cap.
    pub max_connections: usize,

    /// Connections opened eagerly when the pool is created
    pub min_connections: usize,

    /// Non-blocking permit attempts before giving up with `CapacityExhausted`.
    pub acquire_attempts: u32,

    /// Fixed sleep between permit attempts.
    pub acquire_retry_delay: Duration,

    /// How long a checkout waits for the pool once a permit is held
    pub connect_timeout: Duration,

    /// Pooled connections unused for longer than this are closed
    pub idle_timeout: Option<Duration>,

    /// Pooled connections older than this are closed
    pub max_lifetime: Option<Duration>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self {
            max_connections: 20,
            min_connections: 0,
            acquire_attempts: 5,
            acquire_retry_delay: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_attempts(mut self, attempts: u32) -> Self {
        self.acquire_attempts = attempts;
        self
    }

    pub fn acquire_retry_delay(mut self, delay: Duration) -> Self {
        self.acquire_retry_delay = delay;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        if self.acquire_attempts == 0 {
            return Err("acquire_attempts must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}
