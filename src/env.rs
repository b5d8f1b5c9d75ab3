//! Environment variable substitution for configuration values
//!
//! `${VAR_NAME}` references in the config text are replaced before
//! parsing, so credentials can be kept out of the file itself.

use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Substitute `${VAR_NAME}` environment references in `input`.
///
/// Fails listing every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let result = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(
            substitute_env_vars("host: example.com").unwrap(),
            "host: example.com"
        );
    }

    #[test]
    fn test_substitutes_set_variables() {
        env::set_var("WF_ENV_TEST_A", "alpha");
        env::set_var("WF_ENV_TEST_B", "beta");
        let out = substitute_env_vars("${WF_ENV_TEST_A}/${WF_ENV_TEST_B}/${WF_ENV_TEST_A}").unwrap();
        assert_eq!(out, "alpha/beta/alpha");
        env::remove_var("WF_ENV_TEST_A");
        env::remove_var("WF_ENV_TEST_B");
    }

    #[test]
    fn test_missing_variables_listed_once() {
        let err = substitute_env_vars("${WF_ENV_MISSING_X} ${WF_ENV_MISSING_X} ${WF_ENV_MISSING_Y}")
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("WF_ENV_MISSING_X"));
        assert!(msg.contains("WF_ENV_MISSING_Y"));
        assert_eq!(msg.matches("WF_ENV_MISSING_X").count(), 1);
    }

    #[test]
    fn test_partial_patterns_untouched() {
        let input = "$VAR and {VAR} stay as-is";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }
}
