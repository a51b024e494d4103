//! Command line and environment configuration

use std::time::Duration;

use clap::{Parser, ValueEnum};

use gantry_common::retry::RetryConfig;
use gantry_entity::EngineSettings;

/// Client read timeout of the kube client; watches must close before it
const CLIENT_READ_TIMEOUT_SECS: u32 = 30;

/// gantry - keeps a hosted gateway configuration in sync with gantry.dev resources
#[derive(Parser, Debug)]
#[command(name = "gantry-operator", version, about, long_about = None)]
pub struct Cli {
    /// Print all CRD manifests as YAML and exit
    #[arg(long)]
    pub crd: bool,

    /// Controller settings
    #[command(flatten)]
    pub settings: Settings,
}

/// Which remote implementation the engine talks to
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RemoteMode {
    /// The hosted API over HTTPS
    Http,
    /// An in-process store, for offline runs
    Memory,
}

/// Tunables of every controller
#[derive(clap::Args, Debug, Clone)]
pub struct Settings {
    /// Resync interval after a converged pass (seconds)
    #[arg(long, env = "GANTRY_SYNC_PERIOD_SECS", default_value_t = 600)]
    pub sync_period_secs: u64,

    /// Timeout of each remote API call (seconds)
    #[arg(long, env = "GANTRY_REMOTE_TIMEOUT_SECS", default_value_t = 30)]
    pub remote_timeout_secs: u64,

    /// Requeue interval while a dependency is not ready (seconds)
    #[arg(long, env = "GANTRY_DEPENDENCY_BACKOFF_SECS", default_value_t = 5)]
    pub dependency_backoff_secs: u64,

    /// First retry delay after a transient failure (milliseconds)
    #[arg(long, env = "GANTRY_RETRY_INITIAL_DELAY_MS", default_value_t = 1000)]
    pub retry_initial_delay_ms: u64,

    /// Upper bound of the retry delay (seconds)
    #[arg(long, env = "GANTRY_RETRY_MAX_DELAY_SECS", default_value_t = 300)]
    pub retry_max_delay_secs: u64,

    /// Concurrent reconciles per controller
    #[arg(long, env = "GANTRY_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,

    /// Server-side watch timeout (seconds)
    #[arg(long, env = "GANTRY_WATCH_TIMEOUT_SECS", default_value_t = gantry_entity::WATCH_TIMEOUT_SECS)]
    pub watch_timeout_secs: u32,

    /// Remote implementation
    #[arg(long, env = "GANTRY_REMOTE", value_enum, default_value_t = RemoteMode::Http)]
    pub remote: RemoteMode,

    /// OTLP gRPC endpoint for traces and metrics
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Settings {
    /// Reject combinations the controllers cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.watch_timeout_secs == 0 || self.watch_timeout_secs >= CLIENT_READ_TIMEOUT_SECS {
            anyhow::bail!(
                "watch timeout must be between 1 and {} seconds, got {}",
                CLIENT_READ_TIMEOUT_SECS - 1,
                self.watch_timeout_secs
            );
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.remote_timeout_secs == 0 {
            anyhow::bail!("remote timeout must be at least 1 second");
        }
        if Duration::from_millis(self.retry_initial_delay_ms) > self.retry_max_delay() {
            anyhow::bail!("retry initial delay exceeds the maximum delay");
        }
        Ok(())
    }

    /// Resync interval after a converged pass
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs)
    }

    /// Settings of the entity reconcile loop
    pub fn engine(&self) -> EngineSettings {
        EngineSettings {
            sync_period: self.sync_period(),
            remote_timeout: Duration::from_secs(self.remote_timeout_secs),
            dependency_backoff: Duration::from_secs(self.dependency_backoff_secs),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
                max_delay: self.retry_max_delay(),
                ..RetryConfig::default()
            },
        }
    }
}
