//! Configuration Management
//!
//! Settings are layered: CLI flags, then environment, then the optional
//! config file, then defaults. Credentials only ever come from the
//! environment. The resolved [`Settings`] value is immutable and is handed
//! to the client constructor.

use crate::cloud::auth::Credentials;
use crate::error::ConfigError;
use crate::inventory::retry::RetryPolicy;
use crate::inventory::snapshot::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const ENV_ACCESS_KEY: &str = "HUAWEI_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "HUAWEI_SECRET_KEY";
pub const ENV_PROJECT_ID: &str = "HUAWEI_PROJECT_ID";
pub const ENV_REGION: &str = "HUAWEI_REGION";
pub const ENV_ACCOUNT: &str = "HUAWEI_ACCOUNT";
pub const ENV_ENDPOINT: &str = "HUAWEI_ENDPOINT";

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 1000;
const DEFAULT_CONCURRENCY: usize = 4;
const MAX_CONCURRENCY: usize = 64;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const MAX_ATTEMPTS_LIMIT: u32 = 10;
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Persistent defaults read from the config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ecs-inventory").join("config.json"))
    }

    /// Load the config file from its default location.
    /// A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub account: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub page_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub max_attempts: Option<u32>,
    pub endpoint: Option<String>,
}

/// Fully resolved, validated run settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub project_id: String,
    pub region: String,
    /// Account identity embedded in the snapshot and its file name
    pub account: String,
    pub output_dir: PathBuf,
    pub format: OutputFormat,
    pub page_size: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Single base URL used for every service instead of the regional ones
    pub endpoint: Option<Url>,
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn from_env(file: &Config, overrides: &Overrides) -> Result<Self, ConfigError> {
        Self::resolve(file, overrides, |name| std::env::var(name).ok())
    }

    /// Resolve settings with CLI > env > file > default precedence
    pub fn resolve<F>(file: &Config, overrides: &Overrides, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let access_key = env(ENV_ACCESS_KEY).ok_or(ConfigError::Missing {
            name: ENV_ACCESS_KEY,
        })?;
        let secret_key = env(ENV_SECRET_KEY).ok_or(ConfigError::Missing {
            name: ENV_SECRET_KEY,
        })?;
        validate_token(ENV_ACCESS_KEY, &access_key)?;

        let project_id = overrides
            .project_id
            .clone()
            .or_else(|| env(ENV_PROJECT_ID))
            .or_else(|| file.project_id.clone())
            .ok_or(ConfigError::Missing {
                name: ENV_PROJECT_ID,
            })?;
        validate_token(ENV_PROJECT_ID, &project_id)?;

        let region = overrides
            .region
            .clone()
            .or_else(|| env(ENV_REGION))
            .or_else(|| file.region.clone())
            .ok_or(ConfigError::Missing { name: ENV_REGION })?;
        validate_region(&region)?;

        let account = overrides
            .account
            .clone()
            .or_else(|| env(ENV_ACCOUNT))
            .or_else(|| file.account.clone())
            .unwrap_or_else(|| access_key.clone());

        let page_size = bounded(
            "page size",
            overrides.page_size.or(file.page_size),
            DEFAULT_PAGE_SIZE,
            MAX_PAGE_SIZE,
        )?;
        let concurrency = bounded(
            "concurrency",
            overrides.concurrency.or(file.concurrency),
            DEFAULT_CONCURRENCY,
            MAX_CONCURRENCY,
        )?;
        let max_attempts = bounded(
            "max attempts",
            overrides.max_attempts.or(file.max_attempts),
            DEFAULT_MAX_ATTEMPTS,
            MAX_ATTEMPTS_LIMIT,
        )?;
        let base_delay = Duration::from_millis(file.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS));

        let endpoint = overrides
            .endpoint
            .clone()
            .or_else(|| env(ENV_ENDPOINT))
            .or_else(|| file.endpoint.clone())
            .map(|raw| parse_endpoint(&raw))
            .transpose()?;

        Ok(Self {
            credentials: Credentials::new(access_key, secret_key),
            project_id,
            region,
            account,
            output_dir: overrides
                .output_dir
                .clone()
                .or_else(|| file.output_dir.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            format: overrides.format.or(file.format).unwrap_or_default(),
            page_size,
            concurrency,
            retry: RetryPolicy::new(max_attempts, base_delay),
            endpoint,
        })
    }
}

/// Identifiers end up in URL paths and file names
fn validate_token(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name,
            reason: "only letters, digits, '-' and '_' are allowed".to_string(),
        })
    }
}

/// Region names look like `cn-north-4` or `ap-southeast-1`
fn validate_region(region: &str) -> Result<(), ConfigError> {
    let valid = region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && region.contains('-')
        && !region.starts_with('-')
        && !region.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            name: ENV_REGION,
            reason: format!("'{}' is not a region name", region),
        })
    }
}

fn bounded<T>(name: &'static str, value: Option<T>, default: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + std::fmt::Display + Copy,
{
    let value = value.unwrap_or(default);
    if value <= T::default() || value > max {
        return Err(ConfigError::Invalid {
            name,
            reason: format!("must be between 1 and {}, got {}", max, value),
        });
    }
    Ok(value)
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name: ENV_ENDPOINT,
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::Invalid {
            name: ENV_ENDPOINT,
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
