use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

pub struct Config {
    /// Region used for every AWS client. Default: us-east-1
    pub aws_region: String,
    /// Empty polls, over the whole run, before the consumer stops. Default: 10
    pub max_idle_polls: u32,
    /// Delay between empty polls. Default: 500ms
    pub poll_interval: Duration,
    /// Long-poll wait for queue receives, 0-20 seconds. Default: 2
    pub queue_wait_seconds: i32,
    /// Extra column names that need placeholders in update expressions.
    pub reserved_columns: Vec<String>,
    /// Leave rejected requests in the source instead of dropping them.
    pub retain_rejected: bool,
    /// Serve `/health` and `/metrics` here when set.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            max_idle_polls: 10,
            poll_interval: Duration::from_millis(500),
            queue_wait_seconds: 2,
            reserved_columns: Vec::new(),
            retain_rejected: false,
            metrics_addr: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup so parsing can be
    /// exercised without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let aws_region = lookup("AWS_REGION")
            .filter(|region| !region.trim().is_empty())
            .unwrap_or(defaults.aws_region);

        let max_idle_polls = match lookup("MAX_IDLE_POLLS") {
            Some(val) => match val.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("MAX_IDLE_POLLS", val)),
            },
            None => defaults.max_idle_polls,
        };

        let poll_interval = match lookup("POLL_INTERVAL_MS") {
            Some(val) => val
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| invalid("POLL_INTERVAL_MS", val))?,
            None => defaults.poll_interval,
        };

        let queue_wait_seconds = match lookup("QUEUE_WAIT_SECONDS") {
            Some(val) => match val.trim().parse::<i32>() {
                Ok(n) if (0..=20).contains(&n) => n,
                _ => return Err(invalid("QUEUE_WAIT_SECONDS", val)),
            },
            None => defaults.queue_wait_seconds,
        };

        let reserved_columns = lookup("RESERVED_COLUMN_NAMES")
            .map(|val| {
                val.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let retain_rejected = match lookup("RETAIN_REJECTED_REQUESTS") {
            Some(val) => match val.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => return Err(invalid("RETAIN_REJECTED_REQUESTS", val)),
            },
            None => defaults.retain_rejected,
        };

        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(val) => Some(
                val.trim()
                    .parse::<SocketAddr>()
                    .map_err(|_| invalid("METRICS_ADDR", val))?,
            ),
            None => None,
        };

        Ok(Self {
            aws_region,
            max_idle_polls,
            poll_interval,
            queue_wait_seconds,
            reserved_columns,
            retain_rejected,
            metrics_addr,
        })
    }
}

fn invalid(name: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { name, value }
}
