// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use reverso_kernel::config::DEFAULT_VARIANT_COUNT;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Generator,
    Verifier,
}

/// What the generation side hands out as the reference original on pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OriginalRetention {
    /// Original pixel bytes; the verifier compares byte for byte.
    #[default]
    Exact,
    /// Content hash only.
    HashOnly,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub variant_count: usize,
    /// Upper bound on operations per variant for large images.
    pub max_ops_per_variant: Option<usize>,
    /// Store attempts per variant before it is reported as failed.
    pub persist_attempts: u32,
    pub persist_backoff: Duration,
    /// Concurrent variant builds.
    pub workers: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            variant_count: DEFAULT_VARIANT_COUNT,
            max_ops_per_variant: Some(2048),
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(20),
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_in_flight: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            queue_capacity: 256,
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub peer_url: Option<String>,
    pub reconcile_interval: Duration,
    /// Age after which a non-terminal variant is considered stuck.
    pub stuck_after: Duration,
    pub notify_retry: RetryPolicy,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            peer_url: None,
            reconcile_interval: Duration::from_secs(30),
            stuck_after: Duration::from_secs(60),
            notify_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub bind_addr: SocketAddr,
    pub storage_dir: Option<PathBuf>,
    pub auth_token: Option<String>,
    pub retention: OriginalRetention,
    pub generation: GenerationSettings,
    pub scheduler: SchedulerSettings,
    pub protocol: ProtocolSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Generator,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            storage_dir: None,
            auth_token: None,
            retention: OriginalRetention::Exact,
            generation: GenerationSettings::default(),
            scheduler: SchedulerSettings::default(),
            protocol: ProtocolSettings::default(),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("REVERSO_{}", name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, EngineError>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| EngineError::Config(format!("REVERSO_{}={:?}: {}", name, raw, e))),
    }
}

impl NodeConfig {
    /// Defaults overridden by `REVERSO_*` environment variables.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut cfg = NodeConfig::default();

        if let Some(role) = env_var("ROLE") {
            cfg.role = match role.to_ascii_lowercase().as_str() {
                "generator" => NodeRole::Generator,
                "verifier" => NodeRole::Verifier,
                other => return Err(EngineError::Config(format!("unknown role {:?}", other))),
            };
        }
        if let Some(addr) = env_parse("BIND_ADDR")? {
            cfg.bind_addr = addr;
        }
        cfg.protocol.peer_url = env_var("PEER_URL");
        cfg.storage_dir = env_var("STORAGE_DIR").map(PathBuf::from);
        cfg.auth_token = env_var("AUTH_TOKEN");

        if let Some(n) = env_parse("VARIANT_COUNT")? {
            cfg.generation.variant_count = n;
        }
        if let Some(n) = env_parse::<usize>("MAX_OPS_PER_VARIANT")? {
            cfg.generation.max_ops_per_variant = if n == 0 { None } else { Some(n) };
        }
        if let Some(n) = env_parse("MAX_IN_FLIGHT")? {
            cfg.scheduler.max_in_flight = n;
        }
        if let Some(n) = env_parse("QUEUE_CAPACITY")? {
            cfg.scheduler.queue_capacity = n;
        }
        if let Some(n) = env_parse("MAX_ATTEMPTS")? {
            cfg.scheduler.retry.max_attempts = n;
        }
        if let Some(ms) = env_parse("RETRY_BASE_MS")? {
            cfg.scheduler.retry.base_delay = Duration::from_millis(ms);
            cfg.protocol.notify_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("ATTEMPT_TIMEOUT_MS")? {
            cfg.scheduler.attempt_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse("RECONCILE_INTERVAL_SECS")? {
            cfg.protocol.reconcile_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("STUCK_AFTER_SECS")? {
            cfg.protocol.stuck_after = Duration::from_secs(secs);
        }
        if let Some(r) = env_var("ORIGINAL_RETENTION") {
            cfg.retention = match r.to_ascii_lowercase().as_str() {
                "exact" => OriginalRetention::Exact,
                "hash" | "hash_only" => OriginalRetention::HashOnly,
                other => return Err(EngineError::Config(format!("unknown retention {:?}", other))),
            };
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.generation.variant_count == 0 {
            return Err(EngineError::Config("variant count must be at least 1".into()));
        }
        if self.generation.persist_attempts == 0 || self.scheduler.retry.max_attempts == 0 {
            return Err(EngineError::Config("attempt limits must be at least 1".into()));
        }
        if self.scheduler.max_in_flight == 0 || self.scheduler.queue_capacity == 0 {
            return Err(EngineError::Config("scheduler limits must be at least 1".into()));
        }
        if self.role == NodeRole::Verifier && self.protocol.peer_url.is_none() {
            return Err(EngineError::Config("verifier needs REVERSO_PEER_URL".into()));
        }
        Ok(())
    }
}
