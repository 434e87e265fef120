// Service settings
//
// Layered lowest to highest: built-in defaults, optional config file,
// SCOREQ_* environment variables, command-line flags.

use clap::{Args, ValueEnum};
use config::{Config, Environment, File};
use scoreq_core::application::constants::{DEFAULT_MAX_BATCH, ERROR_RECOVERY_SLEEP_DURATION};
use scoreq_core::application::DispatchConfig;
use scoreq_core::domain::{StoreConfig, RESULTS_QUEUE, TRANSACTIONS_QUEUE};
use scoreq_core::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_PREFIX: &str = "SCOREQ";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MODEL_PATH: &str = "fraud_model.json";
const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_STORAGE_PATH: &str = "queues.json";
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_GATHER_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Single JSON snapshot file
    Json,
    /// SQLite database (WAL)
    Sqlite,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Json => write!(f, "json"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Command-line overrides shared by the service and the CLI
#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// Config file (JSON, TOML or YAML by extension)
    #[arg(long, env = "SCOREQ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Queue storage path
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Queue storage backend
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Maximum messages per queue
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Number of scoring workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum requests fetched per dispatch cycle
    #[arg(short = 'p', long = "processors")]
    pub max_batch: Option<usize>,

    /// Model artifact path
    #[arg(long = "model")]
    pub model_path: Option<String>,

    /// Wait bound for each worker reply in ms (0 waits forever)
    #[arg(long)]
    pub gather_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub max_messages_per_queue: usize,
    pub storage_path: String,
    pub storage_backend: StorageBackend,
    pub workers: usize,
    pub max_batch: usize,
    pub model_path: String,
    pub poll_interval_ms: u64,
    pub gather_timeout_ms: u64,
    pub inbound_queue: String,
    pub outbound_queue: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_messages_per_queue: DEFAULT_CAPACITY,
            storage_path: DEFAULT_STORAGE_PATH.to_string(),
            storage_backend: StorageBackend::Json,
            workers: DEFAULT_WORKERS,
            max_batch: DEFAULT_MAX_BATCH,
            model_path: DEFAULT_MODEL_PATH.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            gather_timeout_ms: DEFAULT_GATHER_TIMEOUT_MS,
            inbound_queue: TRANSACTIONS_QUEUE.to_string(),
            outbound_queue: RESULTS_QUEUE.to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> AppError {
    AppError::Config(e.to_string())
}

impl ServiceSettings {
    /// Load from defaults, config file, process environment and `args`
    pub fn load(args: &SettingsArgs) -> Result<Self> {
        Self::load_with_env(args, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    /// Same as [`ServiceSettings::load`] with an explicit environment source
    pub fn load_with_env(args: &SettingsArgs, env: Environment) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("max_messages_per_queue", defaults.max_messages_per_queue as i64)
            .and_then(|b| b.set_default("storage_path", defaults.storage_path))
            .and_then(|b| b.set_default("storage_backend", defaults.storage_backend.to_string()))
            .and_then(|b| b.set_default("workers", defaults.workers as i64))
            .and_then(|b| b.set_default("max_batch", defaults.max_batch as i64))
            .and_then(|b| b.set_default("model_path", defaults.model_path))
            .and_then(|b| b.set_default("poll_interval_ms", defaults.poll_interval_ms as i64))
            .and_then(|b| b.set_default("gather_timeout_ms", defaults.gather_timeout_ms as i64))
            .and_then(|b| b.set_default("inbound_queue", defaults.inbound_queue))
            .and_then(|b| b.set_default("outbound_queue", defaults.outbound_queue))
            .map_err(config_err)?;

        // An explicit config file must exist; the default one is optional
        builder = match &args.config {
            Some(path) => builder.add_source(File::from(path.clone()).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: ServiceSettings = builder
            .add_source(env)
            .set_override_option("storage_path", args.storage_path.clone())
            .and_then(|b| {
                b.set_override_option("storage_backend", args.backend.map(|v| v.to_string()))
            })
            .and_then(|b| {
                b.set_override_option("max_messages_per_queue", args.capacity.map(|v| v as i64))
            })
            .and_then(|b| b.set_override_option("workers", args.workers.map(|v| v as i64)))
            .and_then(|b| b.set_override_option("max_batch", args.max_batch.map(|v| v as i64)))
            .and_then(|b| b.set_override_option("model_path", args.model_path.clone()))
            .and_then(|b| {
                b.set_override_option("gather_timeout_ms", args.gather_timeout_ms.map(|v| v as i64))
            })
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(config_err)?;

        settings.validate()?;
        Ok(settings.expand_paths())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 {
            return Err(AppError::Config("workers must be at least 1".to_string()));
        }
        if self.max_batch < 1 {
            return Err(AppError::Config("max_batch must be at least 1".to_string()));
        }
        if self.max_messages_per_queue < 1 {
            return Err(AppError::Config(
                "max_messages_per_queue must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn expand_paths(mut self) -> Self {
        self.storage_path = shellexpand::tilde(&self.storage_path).into_owned();
        self.model_path = shellexpand::tilde(&self.model_path).into_owned();
        self
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.max_messages_per_queue, &self.storage_path)
    }

    pub fn model_path(&self) -> PathBuf {
        PathBuf::from(&self.model_path)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            inbound_queue: self.inbound_queue.clone(),
            outbound_queue: self.outbound_queue.clone(),
            max_batch: self.max_batch,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            gather_timeout: match self.gather_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            error_recovery: ERROR_RECOVERY_SLEEP_DURATION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .source(Some(map))
    }

    /// Args pointing at an empty config file, so a stray config.json in the cwd is ignored
    fn empty_config() -> (tempfile::TempDir, SettingsArgs) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();
        let args = SettingsArgs {
            config: Some(path),
            ..Default::default()
        };
        (dir, args)
    }

    #[test]
    fn test_defaults() {
        let (_dir, args) = empty_config();
        let settings = ServiceSettings::load_with_env(&args, env(&[])).unwrap();
        assert_eq!(settings, ServiceSettings::default());

        let dispatch = settings.dispatch_config();
        assert_eq!(dispatch.max_batch, 5);
        assert_eq!(dispatch.gather_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.store_config().max_messages_per_queue, 100);
    }

    #[test]
    fn test_layering_file_env_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scoreq.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "max_messages_per_queue": 10,
                "workers": 2,
                "storage_backend": "sqlite",
                "storage_path": "~/scoreq/queues.db"
            })
            .to_string(),
        )
        .unwrap();

        let args = SettingsArgs {
            config: Some(path),
            max_batch: Some(3),
            ..Default::default()
        };
        let settings = ServiceSettings::load_with_env(
            &args,
            env(&[("SCOREQ_WORKERS", "7"), ("SCOREQ_GATHER_TIMEOUT_MS", "0")]),
        )
        .unwrap();

        assert_eq!(settings.max_messages_per_queue, 10);
        assert_eq!(settings.storage_backend, StorageBackend::Sqlite);
        assert_eq!(settings.workers, 7);
        assert_eq!(settings.max_batch, 3);
        assert!(!settings.storage_path.starts_with('~'));
        assert_eq!(settings.dispatch_config().gather_timeout, None);
    }

    #[test]
    fn test_validation() {
        let (_dir, base) = empty_config();
        let args = SettingsArgs {
            workers: Some(0),
            ..base.clone()
        };
        assert!(matches!(
            ServiceSettings::load_with_env(&args, env(&[])),
            Err(AppError::Config(_))
        ));

        let args = SettingsArgs {
            capacity: Some(0),
            ..base
        };
        assert!(matches!(
            ServiceSettings::load_with_env(&args, env(&[])),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let args = SettingsArgs {
            config: Some(PathBuf::from("/nonexistent/scoreq/config.json")),
            ..Default::default()
        };
        assert!(matches!(
            ServiceSettings::load_with_env(&args, env(&[])),
            Err(AppError::Config(_))
        ));
    }
}
