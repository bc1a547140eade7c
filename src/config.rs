use std::time::Duration;

use camino::Utf8PathBuf;

use crate::domain::Provider;
use crate::error::GribError;
use crate::worker::RetryPolicy;

pub const DEFAULT_PARAM: &str = "t_2m";
pub const DEFAULT_MAX_STEP: i64 = 10;
pub const DEFAULT_OUTPUT: &str = "output";
pub const DEFAULT_HEIGHT: &str = "surface";
pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 200;
pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// `None` falls back to the defaults.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<String>,
    pub staging_dir: Option<String>,
    pub weights_dir: Option<String>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub no_regrid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub retry: RetryPolicy,
    pub concurrency: usize,
    pub regrid: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            regrid: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_dir: Utf8PathBuf,
    pub staging_dir: Utf8PathBuf,
    pub weights_dir: Utf8PathBuf,
    pub timeout: Duration,
    pub settings: BatchSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        provider: Provider,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, GribError> {
        let output_dir = non_empty_path(
            "output",
            overrides.output_dir.as_deref().unwrap_or(DEFAULT_OUTPUT),
        )?;
        let staging_dir = match overrides.staging_dir.as_deref() {
            Some(dir) => non_empty_path("staging", dir)?,
            None => default_staging_dir(provider)?,
        };
        let weights_dir = match overrides.weights_dir.as_deref() {
            Some(dir) => non_empty_path("weights", dir)?,
            None => default_weights_dir()?,
        };

        let concurrency = overrides.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(GribError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        let timeout_secs = overrides.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(GribError::InvalidConfig(
                "timeout must be at least 1 second".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            output_dir,
            staging_dir,
            weights_dir,
            timeout: Duration::from_secs(timeout_secs),
            settings: BatchSettings {
                retry: RetryPolicy::new(
                    overrides.retries.unwrap_or(DEFAULT_RETRIES),
                    Duration::from_millis(
                        overrides.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                    ),
                ),
                concurrency,
                regrid: provider == Provider::Dwd && !overrides.no_regrid,
            },
        })
    }
}

fn non_empty_path(label: &str, value: &str) -> Result<Utf8PathBuf, GribError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GribError::InvalidConfig(format!(
            "{label} directory must not be empty"
        )));
    }
    Ok(Utf8PathBuf::from(trimmed))
}

fn default_staging_dir(provider: Provider) -> Result<Utf8PathBuf, GribError> {
    let temp = Utf8PathBuf::from_path_buf(std::env::temp_dir())
        .map_err(|_| GribError::InvalidConfig("non-utf8 temporary directory".to_string()))?;
    Ok(temp.join("gribdl").join(provider.as_str()))
}

fn default_weights_dir() -> Result<Utf8PathBuf, GribError> {
    let cwd = std::env::current_dir().map_err(|err| GribError::Filesystem(err.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| GribError::InvalidConfig("non-utf8 working directory".to_string()))?;
    Ok(cwd.join("weights"))
}
