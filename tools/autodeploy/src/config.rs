//! Run configuration
//!
//! The setup file keeps the keys the field tooling already writes
//! (`Kepware_IP`, `configApiUsername`, `configApiPassword`, `path`) and accepts a
//! handful of optional tuning keys. `AUTODEPLOY_*` environment variables override
//! the file; CLI flags override both.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use errors::{config_error, DeployError, DeployResult};
use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Configuration API port of the Kepware server
pub const DEFAULT_PORT: u16 = 57412;
/// Device-per-channel limit enforced by the server
pub const DEFAULT_DEVICE_LIMIT: usize = 128;
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_TEMPLATES_DIR: &str = "objs";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "AUTODEPLOY_";

/// What the tag stage does when one device's submissions are rejected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagFailurePolicy {
    /// Abort the stage on the first rejected request
    #[default]
    FailFast,
    /// Log the failure and continue with the next device
    BestEffort,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown tag failure policy '{0}' (expected 'fail-fast' or 'best-effort')")]
pub struct UnknownPolicy(String);

impl FromStr for TagFailurePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(Self::FailFast),
            "best-effort" => Ok(Self::BestEffort),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for TagFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail-fast"),
            Self::BestEffort => write!(f, "best-effort"),
        }
    }
}

/// Setup file as written on disk
#[derive(Debug, Default, Deserialize)]
struct SetupFile {
    #[serde(rename = "Kepware_IP")]
    server_address: Option<String>,
    #[serde(rename = "configApiUsername")]
    username: Option<String>,
    #[serde(rename = "configApiPassword")]
    password: Option<String>,
    path: Option<PathBuf>,
    port: Option<u16>,
    scheme: Option<String>,
    device_limit: Option<usize>,
    templates_dir: Option<PathBuf>,
    tag_failure_policy: Option<TagFailurePolicy>,
    request_timeout_secs: Option<u64>,
}

/// Overrides read verbatim: figment would parse `007` or `123456` as numbers
const RAW_ENV_KEYS: [&str; 6] = [
    "server_address",
    "username",
    "password",
    "table_path",
    "scheme",
    "templates_dir",
];

/// `AUTODEPLOY_*` environment overrides
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    #[serde(skip)]
    server_address: Option<String>,
    #[serde(skip)]
    username: Option<String>,
    #[serde(skip)]
    password: Option<String>,
    #[serde(skip)]
    table_path: Option<PathBuf>,
    port: Option<u16>,
    #[serde(skip)]
    scheme: Option<String>,
    device_limit: Option<usize>,
    #[serde(skip)]
    templates_dir: Option<PathBuf>,
    tag_failure_policy: Option<TagFailurePolicy>,
    request_timeout_secs: Option<u64>,
}

impl EnvOverrides {
    fn load() -> DeployResult<Self> {
        let mut env: Self = Figment::from(Env::prefixed(ENV_PREFIX).ignore(&RAW_ENV_KEYS))
            .extract()
            .map_err(|e| config_error!(format!("{}* environment", ENV_PREFIX), e))?;

        env.server_address = raw_env("server_address");
        env.username = raw_env("username");
        env.password = raw_env("password");
        env.table_path = raw_env("table_path").map(PathBuf::from);
        env.scheme = raw_env("scheme");
        env.templates_dir = raw_env("templates_dir").map(PathBuf::from);
        Ok(env)
    }
}

fn raw_env(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())).ok()
}

/// Resolved run configuration
#[derive(Clone)]
pub struct RunConfig {
    /// Configuration server host (IP or name)
    pub server_address: String,
    pub username: String,
    pub password: String,
    /// Input point table
    pub table_path: PathBuf,
    pub port: u16,
    pub scheme: String,
    /// Hard ceiling on devices created per channel
    pub device_limit: usize,
    /// Directory holding the five JSON templates
    pub templates_dir: PathBuf,
    pub tag_failure_policy: TagFailurePolicy,
    pub request_timeout: Duration,
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("server_address", &self.server_address)
            .field("username", &self.username)
            .field("password", &"***")
            .field("table_path", &self.table_path)
            .field("port", &self.port)
            .field("scheme", &self.scheme)
            .field("device_limit", &self.device_limit)
            .field("templates_dir", &self.templates_dir)
            .field("tag_failure_policy", &self.tag_failure_policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl RunConfig {
    /// Load the setup file, apply environment overrides and validate
    ///
    /// Relative table and template paths are resolved against the setup file's
    /// directory.
    pub fn load(setup_path: &Path) -> DeployResult<Self> {
        let display = setup_path.display();
        if !setup_path.is_file() {
            return Err(config_error!(display, "setup file not found"));
        }

        let file: SetupFile = Figment::from(Json::file(setup_path))
            .extract()
            .map_err(|e| config_error!(display, e))?;
        let env = EnvOverrides::load()?;

        let base_dir = setup_path.parent().unwrap_or_else(|| Path::new(""));
        let config = Self::resolve(file, env, base_dir, &display.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn resolve(
        file: SetupFile,
        env: EnvOverrides,
        base_dir: &Path,
        source: &str,
    ) -> DeployResult<Self> {
        let required = |value: Option<String>, key: &str| {
            value.ok_or_else(|| config_error!(source, "missing required key '{}'", key))
        };

        let server_address = required(env.server_address.or(file.server_address), "Kepware_IP")?;
        let username = required(env.username.or(file.username), "configApiUsername")?;
        let password = required(env.password.or(file.password), "configApiPassword")?;
        let table_path = env
            .table_path
            .or(file.path)
            .ok_or_else(|| config_error!(source, "missing required key 'path'"))?;
        let templates_dir = env
            .templates_dir
            .or(file.templates_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATES_DIR));

        Ok(Self {
            server_address: server_address.trim().to_string(),
            username,
            password,
            table_path: resolve_path(base_dir, table_path),
            port: env.port.or(file.port).unwrap_or(DEFAULT_PORT),
            scheme: env
                .scheme
                .or(file.scheme)
                .unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
            device_limit: env
                .device_limit
                .or(file.device_limit)
                .unwrap_or(DEFAULT_DEVICE_LIMIT),
            templates_dir: resolve_path(base_dir, templates_dir),
            tag_failure_policy: env
                .tag_failure_policy
                .or(file.tag_failure_policy)
                .unwrap_or_default(),
            request_timeout: Duration::from_secs(
                env.request_timeout_secs
                    .or(file.request_timeout_secs)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }

    /// Reject values that would only fail later, after network calls started
    pub fn validate(&self) -> DeployResult<()> {
        if self.server_address.is_empty() {
            return Err(DeployError::invalid_config(
                "Kepware_IP",
                "server address is empty",
            ));
        }
        if self.username.is_empty() {
            return Err(DeployError::invalid_config(
                "configApiUsername",
                "username is empty",
            ));
        }
        if self.port == 0 {
            return Err(DeployError::invalid_config("port", "must be non-zero"));
        }
        if self.device_limit == 0 {
            return Err(DeployError::invalid_config(
                "device_limit",
                "must be at least 1",
            ));
        }
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(DeployError::invalid_config(
                "scheme",
                format!("unsupported scheme '{}'", self.scheme),
            ));
        }
        Ok(())
    }

    /// Apply CLI overrides
    pub fn with_overrides(
        mut self,
        device_limit: Option<usize>,
        tag_failure_policy: Option<TagFailurePolicy>,
    ) -> DeployResult<Self> {
        if let Some(limit) = device_limit {
            self.device_limit = limit;
        }
        if let Some(policy) = tag_failure_policy {
            self.tag_failure_policy = policy;
        }
        self.validate()?;
        Ok(self)
    }
}

fn resolve_path(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}
