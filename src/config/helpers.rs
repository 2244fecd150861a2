use std::str::FromStr;

use crate::error::ConfigError;

/// Read an env var, treating unset and blank values the same way.
///
/// Surrounding whitespace and a single layer of matching quotes are stripped
/// so values copied out of `.env` files behave like the parsed ones.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => {
            let normalized = normalize_env_value(&value);
            if normalized.is_empty() {
                Ok(None)
            } else {
                Ok(Some(normalized))
            }
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid unicode".to_string(),
        }),
    }
}

/// Parse an optional env var into `T`, naming the key on failure.
pub(crate) fn parse_optional_env<T>(key: &str, expected: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be {expected}: {e}"),
        })
}

/// Parse a boolean flag. Accepts true/false, 1/0, yes/no, on/off.
pub(crate) fn parse_bool_env(key: &str) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = optional_env(key)? else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{raw}'"),
        }),
    }
}

/// Reject zero for values that drive timers or budgets.
pub(crate) fn require_positive(key: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be > 0".to_string(),
        });
    }
    Ok(value)
}

fn normalize_env_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let maybe_unquoted = trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|inner| inner.strip_suffix('\''))
        })
        .unwrap_or(trimmed);
    maybe_unquoted.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_quotes_and_whitespace() {
        assert_eq!(normalize_env_value("  \"abc\" "), "abc");
        assert_eq!(normalize_env_value("'abc'"), "abc");
        assert_eq!(normalize_env_value("\"unbalanced"), "\"unbalanced");
    }

    #[test]
    fn require_positive_rejects_zero() {
        assert!(require_positive("K", 0).is_err());
        assert_eq!(require_positive("K", 5).unwrap(), 5);
    }
}
