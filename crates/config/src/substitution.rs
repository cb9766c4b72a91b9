use anyhow::Result;
use regex::{Captures, Regex};
use std::env;
use tracing::{debug, warn};

const ENV_VAR_PATTERN: &str = r"\$\{(\w+)\}|\$(\w+)";

/// Substitute environment variables in the format ${VAR_NAME} or $VAR_NAME
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(ENV_VAR_PATTERN)?;
    let mut missing_vars = Vec::new();

    let result = re.replace_all(content, |caps: &Captures| {
        let placeholder = &caps[0];
        let Some(name) = caps.get(1).or(caps.get(2)) else {
            return placeholder.to_string();
        };
        let var_name = name.as_str();

        match env::var(var_name) {
            Ok(value) => {
                // Secrets like the bridge API key pass through here, so no value logging
                debug!("Substituting environment variable: {}", var_name);
                value
            }
            Err(_) => {
                warn!("Environment variable '{}' not set", var_name);
                missing_vars.push(var_name.to_string());
                // Keep the placeholder, the validator reports it
                placeholder.to_string()
            }
        }
    });

    if !missing_vars.is_empty() {
        debug!(
            "Environment variables not set (may use defaults or fail validation): {:?}",
            missing_vars
        );
    }

    Ok(result.into_owned())
}

/// Get environment variable with a default value
pub fn get_env_or_default(var_name: &str, default: &str) -> String {
    match env::var(var_name) {
        Ok(value) => {
            debug!("Using environment variable: {} = \"{}\"", var_name, value);
            value
        }
        Err(_) => {
            warn!(
                "Environment variable '{}' not set, using default: \"{}\"",
                var_name, default
            );
            default.to_string()
        }
    }
}

/// Check if a string contains unresolved environment variable placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    Regex::new(ENV_VAR_PATTERN)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_braced_and_bare() {
        env::set_var("VOLGATE_SUB_HOST", "bridge");
        env::set_var("VOLGATE_SUB_PORT", "8194");

        let out = substitute_env_vars("http://${VOLGATE_SUB_HOST}:$VOLGATE_SUB_PORT").unwrap();
        assert_eq!(out, "http://bridge:8194");
    }

    #[test]
    fn test_bare_var_does_not_rewrite_longer_name() {
        env::set_var("VOLGATE_SUB_A", "short");
        env::set_var("VOLGATE_SUB_AB", "long");

        let out = substitute_env_vars("$VOLGATE_SUB_A/$VOLGATE_SUB_AB").unwrap();
        assert_eq!(out, "short/long");

        let out = substitute_env_vars("$VOLGATE_SUB_AB $VOLGATE_SUB_A").unwrap();
        assert_eq!(out, "long short");
    }

    #[test]
    fn test_missing_var_keeps_placeholder() {
        let out = substitute_env_vars("key: ${VOLGATE_SUB_DEFINITELY_UNSET}").unwrap();
        assert_eq!(out, "key: ${VOLGATE_SUB_DEFINITELY_UNSET}");
        assert!(has_unresolved_env_vars(&out));
    }

    #[test]
    fn test_get_env_or_default() {
        assert_eq!(get_env_or_default("VOLGATE_SUB_ALSO_UNSET", "fallback"), "fallback");
    }
}
