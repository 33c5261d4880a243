use std::time::Duration;

use annolab_inference::InferenceConfig;
use annolab_queue::{BackoffPolicy, QueueConfig};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Model server settings.
    pub inference: InferenceSettings,
    /// Job queue settings.
    pub queue: QueueSettings,
}

/// Model server connection settings.
#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// Base URL of the model server.
    pub url: String,
    /// Model name to generate with.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum simultaneous in-flight inference calls.
    pub max_concurrent: usize,
}

/// Job queue worker settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Number of worker tasks.
    pub worker_count: usize,
    /// Maximum processing attempts per job.
    pub max_attempts: u32,
    /// First retry delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Ceiling on a single processing attempt, in seconds.
    pub job_timeout_secs: u64,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                  |
    /// |----------------------------|--------------------------|
    /// | `HOST`                     | `0.0.0.0`                |
    /// | `PORT`                     | `3000`                   |
    /// | `CORS_ORIGINS`             | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                     |
    /// | `INFERENCE_URL`            | `http://localhost:11434` |
    /// | `INFERENCE_MODEL`          | `llama2`                 |
    /// | `INFERENCE_TIMEOUT_SECS`   | `60`                     |
    /// | `MAX_CONCURRENT_INFERENCE` | `3`                      |
    /// | `WORKER_COUNT`             | `2`                      |
    /// | `JOB_MAX_ATTEMPTS`         | `3`                      |
    /// | `JOB_BACKOFF_BASE_MS`      | `1000`                   |
    /// | `JOB_TIMEOUT_SECS`         | `120`                    |
    /// | `QUEUE_POLL_INTERVAL_MS`   | `500`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", 30);
        let shutdown_timeout_secs = parse_env("SHUTDOWN_TIMEOUT_SECS", 30);

        let inference = InferenceSettings {
            url: std::env::var("INFERENCE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".into()),
            model: std::env::var("INFERENCE_MODEL").unwrap_or_else(|_| "llama2".into()),
            timeout_secs: parse_env("INFERENCE_TIMEOUT_SECS", 60),
            max_concurrent: parse_env("MAX_CONCURRENT_INFERENCE", 3),
        };

        let queue = QueueSettings {
            worker_count: parse_env("WORKER_COUNT", 2),
            max_attempts: parse_env("JOB_MAX_ATTEMPTS", 3),
            backoff_base_ms: parse_env("JOB_BACKOFF_BASE_MS", 1000),
            job_timeout_secs: parse_env("JOB_TIMEOUT_SECS", 120),
            poll_interval_ms: parse_env("QUEUE_POLL_INTERVAL_MS", 500),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            inference,
            queue,
        }
    }
}

impl InferenceSettings {
    /// Convert to the inference client's config.
    pub fn client_config(&self) -> InferenceConfig {
        InferenceConfig {
            base_url: self.url.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl QueueSettings {
    /// Convert to the queue's runtime config.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            worker_count: self.worker_count,
            max_attempts: self.max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(self.backoff_base_ms),
                ..BackoffPolicy::default()
            },
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }
}

/// Parse an env var, falling back to `default` when unset. Panics on a
/// malformed value so misconfiguration fails fast at startup.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be valid: {e}")),
        Err(_) => default,
    }
}
