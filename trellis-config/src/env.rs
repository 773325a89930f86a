// Environment variable loading

use crate::{ConfigError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::env;

/// Reads environment variables, optionally restricted to a prefix.
///
/// With prefix `TRELLIS`, `TRELLIS_MAX_BODY_SIZE` is exposed as
/// `max_body_size`.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Configuration key for an environment variable name, if the name
    /// carries the prefix.
    pub fn key_for(&self, name: &str) -> Option<String> {
        match &self.prefix {
            Some(prefix) => {
                let rest = name.strip_prefix(prefix.as_str())?.strip_prefix('_')?;
                (!rest.is_empty()).then(|| rest.to_lowercase())
            }
            None => Some(name.to_lowercase()),
        }
    }

    /// Every matching variable, keyed by configuration key.
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.collect(env::vars()))
    }

    fn collect(&self, vars: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
        vars.into_iter()
            .filter_map(|(name, value)| self.key_for(&name).map(|key| (key, value)))
            .collect()
    }

    /// A single variable by configuration key.
    pub fn load_var(&self, key: &str) -> Result<String> {
        let name = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        };
        env::var(&name).map_err(ConfigError::EnvError)
    }

    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

/// Typed value for a raw environment string: integers, floats and booleans
/// become JSON numbers and booleans, everything else stays a string.
pub fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if float.is_finite() {
            return Value::from(float);
        }
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // std::env::set_var is unsafe in edition 2024, so prefix handling is
    // exercised through `collect` with synthetic variables.

    #[test]
    fn test_prefix_stripping() {
        let loader = EnvLoader::new(Some("TRELLIS".to_string()));
        let vars = loader.collect(vec![
            ("TRELLIS_PORT".to_string(), "9000".to_string()),
            ("TRELLIS_MAX_BODY_SIZE".to_string(), "1024".to_string()),
            ("TRELLISX_PORT".to_string(), "1".to_string()),
            ("TRELLIS_".to_string(), "empty".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars["port"], "9000");
        assert_eq!(vars["max_body_size"], "1024");
    }

    #[test]
    fn test_no_prefix_takes_everything() {
        let loader = EnvLoader::default();
        assert_eq!(loader.key_for("HOST").as_deref(), Some("host"));
    }

    #[test]
    fn test_missing_var() {
        let loader = EnvLoader::new(Some("TRELLIS_TEST".to_string()));
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
        assert_eq!(loader.load_var_or("MISSING_VAR_67890", "fallback"), "fallback");
    }

    #[test]
    fn test_coerce() {
        assert_eq!(coerce("8080"), Value::from(8080));
        assert_eq!(coerce("0.5"), Value::from(0.5));
        assert_eq!(coerce("TRUE"), Value::Bool(true));
        assert_eq!(coerce("localhost"), Value::String("localhost".into()));
        assert_eq!(coerce("NaN"), Value::String("NaN".into()));
    }
}
