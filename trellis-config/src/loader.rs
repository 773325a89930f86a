// Configuration file loaders

use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }

    /// Format implied by a path's extension.
    pub fn detect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                ConfigError::LoadError(format!("no file extension on `{}`", path.display()))
            })?;
        Self::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("unsupported format `{}`", ext)))
    }
}

/// Parses configuration documents into a JSON object.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FileFormat::detect(path)?))
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("failed to read `{}`: {}", path.display(), e))
        })?;
        self.parse(&content)
    }

    /// Parse a document. The top level must be a table/object.
    pub fn parse(&self, content: &str) -> Result<Value> {
        let value = match self.format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON: {}", e)))?,
            FileFormat::Toml => {
                let table: toml::Table = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("TOML: {}", e)))?;
                serde_json::to_value(table)
                    .map_err(|e| ConfigError::SerializationError(e.to_string()))?
            }
            FileFormat::Env => parse_env(content),
        };

        if !value.is_object() {
            return Err(ConfigError::ParseError(
                "top level of a configuration document must be a table".into(),
            ));
        }
        Ok(value)
    }
}

/// `KEY=value` lines; blank lines and `#` comments are skipped. Keys are
/// lowercased and values coerced like environment variables.
fn parse_env(content: &str) -> Value {
    let mut map = Map::new();
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            map.insert(key.trim().to_lowercase(), crate::env::coerce(value));
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let value = ConfigLoader::new(FileFormat::Toml)
            .parse(
                r#"
                host = "0.0.0.0"
                port = 9000
                "#,
            )
            .unwrap();
        assert_eq!(value["host"], "0.0.0.0");
        assert_eq!(value["port"], 9000);
    }

    #[test]
    fn test_parse_json_requires_object() {
        let loader = ConfigLoader::new(FileFormat::Json);
        assert!(loader.parse(r#"{"port": 1}"#).is_ok());
        assert!(matches!(
            loader.parse("[1, 2]").unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }

    #[test]
    fn test_parse_env() {
        let value = ConfigLoader::new(FileFormat::Env)
            .parse(
                r#"
                # server
                PORT=8081
                export LOG_FORMAT="pretty"
                "#,
            )
            .unwrap();
        assert_eq!(value["port"], 8081);
        assert_eq!(value["log_format"], "pretty");
    }

    #[test]
    fn test_detect() {
        assert_eq!(FileFormat::detect("trellis.toml").unwrap(), FileFormat::Toml);
        assert_eq!(FileFormat::detect("conf/app.JSON").unwrap(), FileFormat::Json);
        assert!(FileFormat::detect("trellis").is_err());
        assert!(FileFormat::detect("trellis.yaml").is_err());
        assert_eq!(ConfigLoader::auto(".env.env").unwrap().format(), FileFormat::Env);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new(FileFormat::Toml)
            .load_file("/definitely/not/here.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
