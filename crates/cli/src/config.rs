use crate::{env::EnvManager, error::CliError};
use connectors::catalog::http::{ApiCredentials, HttpCatalogConfig};
use std::path::PathBuf;
use std::time::Duration;
use sync_core::gate::RateGateConfig;
use sync_runtime::discovery::ExecutionMode;

const DEFAULT_CONCURRENCY: usize = 2;
const DEFAULT_BATCH_SIZE: usize = 25;
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the pipeline needs, resolved from the environment once at
/// startup.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub mode: ExecutionMode,
    pub bucket: String,
    pub store_root: PathBuf,
    pub api_base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub concurrency: usize,
    pub batch_size: usize,
    pub state_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl SyncConfig {
    pub fn from_env(env: &EnvManager) -> Result<Self, CliError> {
        let mode = match env.get("EXECUTION_MODE").unwrap_or("development") {
            "production" => ExecutionMode::Production,
            "development" => ExecutionMode::Development,
            other => {
                return Err(CliError::Config(format!(
                    "EXECUTION_MODE must be 'development' or 'production', got '{other}'"
                )));
            }
        };

        let bucket = match mode {
            ExecutionMode::Production => required(env, "S3_BUCKET_NAME")?,
            ExecutionMode::Development => required(env, "S3_TEST_BUCKET_NAME")?,
        };

        let api_base_url = match mode {
            ExecutionMode::Production => required(env, "WOO_API_BASE_URL")?,
            ExecutionMode::Development => env
                .get("WOO_API_BASE_URL_DEV")
                .or_else(|| env.get("WOO_API_BASE_URL_TEST"))
                .map(str::to_string)
                .map_or_else(|| required(env, "WOO_API_BASE_URL"), Ok)?,
        };

        Ok(Self {
            mode,
            bucket,
            store_root: env
                .get("FEED_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./feed-store")),
            api_base_url,
            consumer_key: required(env, "WOO_CONSUMER_KEY")?,
            consumer_secret: required(env, "WOO_CONSUMER_SECRET")?,
            concurrency: parsed(env, "CONCURRENCY", DEFAULT_CONCURRENCY)?,
            batch_size: parsed(env, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            state_dir: Self::state_dir_from(env),
            output_dir: env
                .get("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./output-files")),
        })
    }

    /// Resolvable without the rest of the config, for read-only commands.
    pub fn state_dir_from(env: &EnvManager) -> PathBuf {
        if let Some(dir) = env.get("STATE_DIR") {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conveyor/state")
    }

    /// Development keeps the remote on a tighter leash.
    pub fn rate_gate(&self) -> RateGateConfig {
        match self.mode {
            ExecutionMode::Development => RateGateConfig::development(),
            ExecutionMode::Production => RateGateConfig::production(),
        }
    }

    pub fn catalog(&self) -> HttpCatalogConfig {
        HttpCatalogConfig {
            base_url: self.api_base_url.clone(),
            credentials: ApiCredentials {
                consumer_key: self.consumer_key.clone(),
                consumer_secret: self.consumer_secret.clone(),
            },
            timeout: DEFAULT_API_TIMEOUT,
        }
    }
}

fn required(env: &EnvManager, key: &str) -> Result<String, CliError> {
    env.get(key)
        .map(str::to_string)
        .ok_or_else(|| CliError::Config(format!("Missing required environment variable {key}")))
}

fn parsed(env: &EnvManager, key: &str, default: usize) -> Result<usize, CliError> {
    match env.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| CliError::Config(format!("{key} must be a positive integer, got '{raw}'"))),
    }
}
