use std::env;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::ConfigError;

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env pattern is a valid regex")
    })
}

/// Replace every `${VAR_NAME}` in `input` with the value of that environment variable.
///
/// All missing variables are collected and reported together.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let result = env_pattern().replace_all(input, |cap: &Captures<'_>| {
        let name = &cap[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m: &String| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env() {
        env::set_var("DEVSIM_HOST", "sim.local");
        env::set_var("DEVSIM_PORT", "9000");

        let input = "http://${DEVSIM_HOST}:${DEVSIM_PORT}/api";
        let result = interpolate_env(input).unwrap();
        assert_eq!(result, "http://sim.local:9000/api");
    }

    #[test]
    fn test_interpolate_env_missing() {
        let input = "prefix ${DEVSIM_MISSING_12345} suffix";
        match interpolate_env(input) {
            Err(ConfigError::MissingEnvVars(vars)) => {
                assert_eq!(vars, vec!["DEVSIM_MISSING_12345"]);
            }
            other => panic!("Expected MissingEnvVars error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_env_missing_reported_once() {
        let input = "${DEVSIM_GONE_1} ${DEVSIM_GONE_1} ${DEVSIM_GONE_2}";
        match interpolate_env(input) {
            Err(ConfigError::MissingEnvVars(vars)) => {
                assert_eq!(vars, vec!["DEVSIM_GONE_1", "DEVSIM_GONE_2"]);
            }
            other => panic!("Expected MissingEnvVars error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_env_no_vars() {
        assert_eq!(interpolate_env("interval: 3s").unwrap(), "interval: 3s");
    }

    #[test]
    fn test_interpolate_env_partial_syntax_not_matched() {
        let input = "not a $VAR or ${VAR variable";
        assert_eq!(interpolate_env(input).unwrap(), input);
    }

    #[test]
    fn test_interpolate_env_value_with_dollar() {
        env::set_var("DEVSIM_SPECIAL", "pa$$word");
        assert_eq!(interpolate_env("${DEVSIM_SPECIAL}").unwrap(), "pa$$word");
    }
}
