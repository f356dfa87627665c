use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub nats_url: String,
    pub port: u16,
    pub naming: Naming,
    pub timeouts: Timeouts,
    /// Fixed delay between outbox sweeps.
    pub sweep_interval: Duration,
    /// Maximum rows claimed per sweep.
    pub sweep_batch_size: i64,
    /// Fixed delay between expired-lease reaps.
    pub lease_reap_interval: Duration,
    /// Command names this instance consumes and pre-announces queues for.
    pub command_names: Vec<String>,
}

/// Queue and topic naming conventions, applied on both the produce and
/// consume side of the fence.
#[derive(Debug, Clone)]
pub struct Naming {
    pub command_prefix: String,
    pub queue_suffix: String,
    pub reply_queue: String,
    pub event_prefix: String,
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            command_prefix: "APP.CMD.".to_string(),
            queue_suffix: ".Q".to_string(),
            reply_queue: "APP.CMD.REPLY.Q".to_string(),
            event_prefix: "events.".to_string(),
        }
    }
}

impl Naming {
    /// Build a command queue name from a command name.
    /// Example: CreateUser -> APP.CMD.CreateUser.Q
    pub fn command_queue(&self, command_name: &str) -> String {
        format!("{}{}{}", self.command_prefix, command_name, self.queue_suffix)
    }

    /// Build an event topic name from a command name.
    /// Example: CreateUser -> events.CreateUser
    pub fn event_topic(&self, command_name: &str) -> String {
        format!("{}{}", self.event_prefix, command_name)
    }

    /// Recover a command name from a queue name, tolerating queues that do
    /// not follow the convention (falls back to the last dot segment).
    pub fn command_name_from_queue(&self, queue: &str) -> String {
        let trimmed = queue
            .strip_suffix(self.queue_suffix.as_str())
            .unwrap_or(queue);
        if let Some(name) = trimmed.strip_prefix(self.command_prefix.as_str()) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
        match trimmed.rsplit('.').next() {
            Some(last) if !last.is_empty() => last.to_string(),
            _ => trimmed.to_string(),
        }
    }
}

/// Lease, backoff, and synchronous-wait settings.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Lease held while a command is RUNNING.
    pub command_lease: Duration,
    /// Cap on the outbox reschedule delay.
    pub max_backoff: Duration,
    /// Bounded HTTP wait for a reply. Zero means async-only ingest.
    pub sync_wait: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_lease: Duration::from_secs(300),
            max_backoff: Duration::from_secs(300),
            sync_wait: Duration::from_secs(2),
        }
    }
}

impl Timeouts {
    /// Whether ingest should skip the synchronous wait entirely.
    pub fn is_async(&self) -> bool {
        self.sync_wait.is_zero()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Naming::default();
        let timeout_defaults = Timeouts::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            nats_url: env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            naming: Naming {
                command_prefix: env::var("COMMAND_PREFIX")
                    .unwrap_or(defaults.command_prefix),
                queue_suffix: env::var("QUEUE_SUFFIX").unwrap_or(defaults.queue_suffix),
                reply_queue: env::var("REPLY_QUEUE").unwrap_or(defaults.reply_queue),
                event_prefix: env::var("EVENT_PREFIX").unwrap_or(defaults.event_prefix),
            },
            timeouts: Timeouts {
                command_lease: duration_secs_var(
                    "COMMAND_LEASE_SECONDS",
                    timeout_defaults.command_lease,
                )?,
                max_backoff: duration_secs_var("MAX_BACKOFF_SECONDS", timeout_defaults.max_backoff)?,
                sync_wait: duration_millis_var("SYNC_WAIT_MILLIS", timeout_defaults.sync_wait)?,
            },
            sweep_interval: duration_secs_var("SWEEP_INTERVAL_SECONDS", Duration::from_secs(30))?,
            lease_reap_interval: duration_secs_var(
                "LEASE_REAP_INTERVAL_SECONDS",
                Duration::from_secs(60),
            )?,
            sweep_batch_size: env::var("SWEEP_BATCH_SIZE")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("SWEEP_BATCH_SIZE must be a valid number")?,
            command_names: env::var("COMMAND_NAMES")
                .unwrap_or_else(|_| "CreateUser".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

fn duration_secs_var(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", name))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

fn duration_millis_var(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => {
            let millis: u64 = raw
                .parse()
                .with_context(|| format!("{} must be a whole number of milliseconds", name))?;
            Ok(Duration::from_millis(millis))
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_queue_follows_convention() {
        let naming = Naming::default();
        assert_eq!(naming.command_queue("CreateUser"), "APP.CMD.CreateUser.Q");
    }

    #[test]
    fn event_topic_follows_convention() {
        let naming = Naming::default();
        assert_eq!(naming.event_topic("CreateUser"), "events.CreateUser");
    }

    #[test]
    fn command_name_recovered_from_conventional_queue() {
        let naming = Naming::default();
        assert_eq!(
            naming.command_name_from_queue("APP.CMD.CreateUser.Q"),
            "CreateUser"
        );
    }

    #[test]
    fn command_name_falls_back_to_last_segment() {
        let naming = Naming::default();
        assert_eq!(
            naming.command_name_from_queue("OTHER.NS.ArchiveOrder.Q"),
            "ArchiveOrder"
        );
        assert_eq!(naming.command_name_from_queue("plain"), "plain");
    }

    #[test]
    fn zero_sync_wait_means_async() {
        let timeouts = Timeouts {
            sync_wait: Duration::ZERO,
            ..Timeouts::default()
        };
        assert!(timeouts.is_async());
        assert!(!Timeouts::default().is_async());
    }
}
