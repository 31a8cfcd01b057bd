/// runtime settings for the dispatch and cache actors
///
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// what a sender does when an actor's inbound queue is full
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// wait for room in the queue
    #[default]
    Block,
    /// fail immediately with a queue-full error
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
    pub backpressure: Backpressure,
}

impl QueueConfig {
    pub fn new(capacity: usize, backpressure: Backpressure) -> QueueConfig {
        QueueConfig {
            capacity,
            backpressure,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::new(10, Backpressure::Block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub queue: QueueConfig,
    pub flush_interval_ms: u64,
}

impl CacheConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            queue: QueueConfig::new(20, Backpressure::Block),
            flush_interval_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub queue: QueueConfig,
    pub heartbeat_interval_ms: u64,
    /// caller-side limit on a submit, enqueue included; None waits forever
    pub response_timeout_ms: Option<u64>,
    /// finish already queued jobs on shutdown instead of abandoning them
    pub drain_on_shutdown: bool,
}

impl DispatchConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            queue: QueueConfig::new(10, Backpressure::Block),
            heartbeat_interval_ms: 30_000,
            response_timeout_ms: None,
            drain_on_shutdown: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub dispatch: DispatchConfig,
    pub shutdown_grace_ms: u64,
    /// optional log4rs yaml file
    pub log_config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache: CacheConfig::default(),
            dispatch: DispatchConfig::default(),
            shutdown_grace_ms: 5_000,
            log_config: None,
        }
    }
}

impl Config {
    pub fn from_json(js: &str) -> Result<Config> {
        let config: Config = serde_json::from_str(js).context("parse config json")?;
        config.validate()?;
        Ok(config)
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        Config::from_json(&text)
    }

    /// install the log4rs backend from `log_config`, or the console default when unset
    pub fn init_logging(&self) -> Result<()> {
        crate::logging::init(self.log_config.as_deref())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// zero capacities and zero intervals cannot be turned into channels or timers
    pub fn validate(&self) -> Result<()> {
        if self.cache.queue.capacity == 0 {
            return Err(anyhow!("cache queue capacity must be greater than zero"));
        }
        if self.dispatch.queue.capacity == 0 {
            return Err(anyhow!("dispatch queue capacity must be greater than zero"));
        }
        if self.cache.flush_interval_ms == 0 {
            return Err(anyhow!("cache flush interval must be greater than zero"));
        }
        if self.dispatch.heartbeat_interval_ms == 0 {
            return Err(anyhow!("heartbeat interval must be greater than zero"));
        }
        if self.dispatch.response_timeout_ms == Some(0) {
            return Err(anyhow!("response timeout must be greater than zero"));
        }

        Ok(())
    }
}
