use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MirrorError;
use crate::scheduler::{DEFAULT_CRON_PATTERN, Scheduler};

pub const DEFAULT_API_HOST: &str = "https://ipdc.vlaanderen.be";
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const DEFAULT_LDES_FOLDER: &str = "ipdc-products";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Raw settings, every field optional. Filled from a JSON file and/or the
/// environment, then validated into a [`ResolvedConfig`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub ldes_folder: Option<String>,
    #[serde(default)]
    pub enable_polling: Option<bool>,
    #[serde(default)]
    pub cron_pattern: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, MirrorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the environment through `lookup`; empty values count as unset.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, MirrorError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let request_timeout_secs = match var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                MirrorError::InvalidConfig(format!("REQUEST_TIMEOUT_SECS is not a number: {raw}"))
            })?),
            None => None,
        };
        Ok(Self {
            api_host: var("IPDC_API_HOST"),
            api_key: var("IPDC_API_KEY"),
            data_dir: var("DATA_DIR"),
            ldes_folder: var("LDES_FOLDER"),
            enable_polling: var("ENABLE_POLLING").map(|raw| is_truthy(&raw)),
            cron_pattern: var("CRON_PATTERN"),
            request_timeout_secs,
        })
    }

    /// Fields set in `over` win.
    pub fn merge(self, over: Config) -> Config {
        Config {
            api_host: over.api_host.or(self.api_host),
            api_key: over.api_key.or(self.api_key),
            data_dir: over.data_dir.or(self.data_dir),
            ldes_folder: over.ldes_folder.or(self.ldes_folder),
            enable_polling: over.enable_polling.or(self.enable_polling),
            cron_pattern: over.cron_pattern.or(self.cron_pattern),
            request_timeout_secs: over.request_timeout_secs.or(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_host: Url,
    pub api_key: String,
    pub archive_dir: Utf8PathBuf,
    pub polling_enabled: bool,
    pub scheduler: Scheduler,
    pub cron_pattern: String,
    pub request_timeout: Duration,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// File settings (if a path is given) overlaid by the process environment.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, MirrorError> {
        Self::resolve_config(Self::load(path)?)
    }

    /// Merged settings without validation, for commands that only touch the archive.
    pub fn load(path: Option<&str>) -> Result<Config, MirrorError> {
        let file = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => Config::default(),
        };
        Ok(file.merge(Config::from_env()?))
    }

    pub fn read(path: PathBuf) -> Result<Config, MirrorError> {
        let content = fs::read_to_string(&path).map_err(|_| MirrorError::ConfigRead(path.clone()))?;
        serde_json::from_str(&content).map_err(|err| MirrorError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, MirrorError> {
        let archive_dir = archive_dir(&config)?;
        let api_key = config
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(MirrorError::MissingApiKey)?;

        let raw_host = config.api_host.unwrap_or_else(|| DEFAULT_API_HOST.to_string());
        let api_host = Url::parse(raw_host.trim())
            .map_err(|err| MirrorError::InvalidConfig(format!("api host {raw_host}: {err}")))?;
        if !matches!(api_host.scheme(), "http" | "https") {
            return Err(MirrorError::InvalidConfig(format!(
                "api host must be an http(s) URL: {raw_host}"
            )));
        }

        let cron_pattern = config
            .cron_pattern
            .unwrap_or_else(|| DEFAULT_CRON_PATTERN.to_string());
        let scheduler = Scheduler::parse(&cron_pattern)?;

        let timeout_secs = config
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(MirrorError::InvalidConfig(
                "request timeout must be at least one second".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            api_host,
            api_key,
            archive_dir,
            polling_enabled: config.enable_polling.unwrap_or(false),
            scheduler,
            cron_pattern,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// `{data_dir}/{ldes_folder}`.
pub fn archive_dir(config: &Config) -> Result<Utf8PathBuf, MirrorError> {
    let ldes_folder = config.ldes_folder.as_deref().unwrap_or(DEFAULT_LDES_FOLDER);
    if ldes_folder.split(['/', '\\']).any(|part| part == "..") {
        return Err(MirrorError::InvalidConfig(format!(
            "ldes folder must stay inside the data directory: {ldes_folder}"
        )));
    }
    let data_dir = config.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR);
    Ok(Utf8PathBuf::from(data_dir).join(ldes_folder.trim_start_matches('/')))
}

/// `true`, `1`, `yes` and `on`, case-insensitive. Anything else is false.
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
