// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Field-level checks used by [`Validate`] implementations.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(invalid(field, "cannot be empty"));
        }
        Ok(())
    }

    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(invalid(
                field,
                &format!("must be between {} and {} (got {})", min, max, value),
            ));
        }
        Ok(())
    }

    /// Case-insensitive membership check.
    pub fn one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
        if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value.trim())) {
            return Err(invalid(
                field,
                &format!("must be one of {} (got `{}`)", allowed.join(", "), value),
            ));
        }
        Ok(())
    }

    /// Non-zero port. Listeners that accept an ephemeral port skip this.
    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return Err(invalid(field, "must be a valid port number"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::ValidationError(format!("{} {}", field, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_empty() {
        assert!(ConfigValidator::not_empty("value", "host").is_ok());
        assert!(ConfigValidator::not_empty("  ", "host").is_err());
    }

    #[test]
    fn test_in_range_message() {
        assert!(ConfigValidator::in_range(5, 1, 10, "n").is_ok());
        let err = ConfigValidator::in_range(0, 1, 10, "n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: n must be between 1 and 10 (got 0)"
        );
    }

    #[test]
    fn test_one_of() {
        let allowed = ["json", "plain"];
        assert!(ConfigValidator::one_of("JSON", &allowed, "log_format").is_ok());
        assert!(ConfigValidator::one_of("xml", &allowed, "log_format").is_err());
    }

    #[test]
    fn test_port() {
        assert!(ConfigValidator::is_port(8080, "port").is_ok());
        assert!(ConfigValidator::is_port(0, "port").is_err());
    }
}
