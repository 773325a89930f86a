// Typed settings of the HTTP front-end

use crate::validation::{ConfigValidator, Validate};
use crate::{ConfigLoader, ConfigManager, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Environment prefix for Trellis settings (`TRELLIS_PORT`, ...).
pub const ENV_PREFIX: &str = "TRELLIS";
/// Variable naming an explicit configuration file.
pub const CONFIG_FILE_VAR: &str = "TRELLIS_CONFIG";
/// File picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "trellis.toml";

pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
pub const LOG_FORMATS: &[&str] = &["json", "plain", "pretty", "compact"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub max_body_size: usize,
    pub shutdown_timeout_secs: u64,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 2 * 1024 * 1024,
            shutdown_timeout_secs: 30,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.host, "host")?;
        ConfigValidator::in_range(self.max_body_size, 1, 1 << 30, "max_body_size")?;
        ConfigValidator::in_range(self.shutdown_timeout_secs, 0, 3600, "shutdown_timeout_secs")?;
        ConfigValidator::one_of(&self.log_level, LOG_LEVELS, "log_level")?;
        ConfigValidator::one_of(&self.log_format, LOG_FORMATS, "log_format")?;
        Ok(())
    }
}

impl ServerConfig {
    /// Load settings, later sources overriding earlier ones:
    ///
    /// 1. built-in defaults
    /// 2. the file named by `TRELLIS_CONFIG`, else `trellis.toml` if present
    /// 3. `.env` in the working directory
    /// 4. `TRELLIS_*` environment variables
    pub fn load() -> Result<Self> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX);

        let file = std::env::var(CONFIG_FILE_VAR)
            .ok()
            .or_else(|| Path::new(DEFAULT_CONFIG_FILE).exists().then(|| DEFAULT_CONFIG_FILE.to_string()));
        if let Some(path) = file {
            debug!(path = %path, "Loading configuration file");
            manager.load_file(&path, ConfigLoader::auto(&path)?.format())?;
        }

        manager.load_dotenv(None)?;
        manager.load_validated()
    }

    /// Load settings from one file only, without the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manager = ConfigManager::new();
        manager.load_file(path, ConfigLoader::auto(path)?.format())?;
        manager.load_validated()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
