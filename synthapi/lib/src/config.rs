//! Runtime configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `OPENAI_API_KEY` | required for extraction |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `SYNTHAPI_MODEL` | `gpt-4o-mini` |
//! | `SYNTHAPI_BUCKET_URL` | required for uploads |
//! | `SYNTHAPI_INIT_URL` | required for remote initialization |
//! | `LAMBDA_GET_URL` | required for mock requests |
//! | `SYNTHAPI_HOME` | `~/.synthapi` |
//! | `SYNTHAPI_TIMEOUT_SECS` | `30` |
//! | `SYNTHAPI_PORT` | `8000` |
//!
//! Required values are only checked when a command needs them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::registry::{JsonFileRegistryStore, Registry};
use crate::workspace::SpecWorkspace;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 8000;

const HOME_DIR_NAME: &str = ".synthapi";
const REGISTRY_FILE: &str = "api_registry.json";
const GENERATED_DIR: &str = "generated_apis";

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: Url,
    pub model: String,
    pub bucket_url: Option<Url>,
    pub init_url: Option<Url>,
    pub mock_url: Option<Url>,
    pub home: PathBuf,
    pub timeout: Duration,
    pub port: u16,
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Invalid`] for malformed URLs or numbers and
    /// [`ConfigError::NoHome`] when no data directory can be determined.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let home = match get("SYNTHAPI_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .ok_or(ConfigError::NoHome)?
                .join(HOME_DIR_NAME),
        };

        Ok(Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: parse_url(
                "OPENAI_BASE_URL",
                &get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            )?,
            model: get("SYNTHAPI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bucket_url: get("SYNTHAPI_BUCKET_URL")
                .map(|v| parse_url("SYNTHAPI_BUCKET_URL", &v))
                .transpose()?,
            init_url: get("SYNTHAPI_INIT_URL")
                .map(|v| parse_url("SYNTHAPI_INIT_URL", &v))
                .transpose()?,
            mock_url: get("LAMBDA_GET_URL")
                .map(|v| parse_url("LAMBDA_GET_URL", &v))
                .transpose()?,
            home,
            timeout: Duration::from_secs(parse_number(
                "SYNTHAPI_TIMEOUT_SECS",
                get("SYNTHAPI_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
            port: parse_number("SYNTHAPI_PORT", get("SYNTHAPI_PORT"), DEFAULT_PORT)?,
        })
    }

    pub fn registry_path(&self) -> PathBuf {
        self.home.join(REGISTRY_FILE)
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.home.join(GENERATED_DIR)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// The file-backed registry under the data directory.
    pub fn registry(&self) -> Registry<JsonFileRegistryStore> {
        Registry::new(JsonFileRegistryStore::new(self.registry_path()))
    }

    /// The generated-spec directory under the data directory.
    pub fn workspace(&self) -> SpecWorkspace {
        SpecWorkspace::new(self.generated_dir())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))
    }

    pub fn require_bucket_url(&self) -> Result<&Url, ConfigError> {
        self.bucket_url
            .as_ref()
            .ok_or(ConfigError::Missing("SYNTHAPI_BUCKET_URL"))
    }

    pub fn require_init_url(&self) -> Result<&Url, ConfigError> {
        self.init_url
            .as_ref()
            .ok_or(ConfigError::Missing("SYNTHAPI_INIT_URL"))
    }

    pub fn require_mock_url(&self) -> Result<&Url, ConfigError> {
        self.mock_url
            .as_ref()
            .ok_or(ConfigError::Missing("LAMBDA_GET_URL"))
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

fn parse_number<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
