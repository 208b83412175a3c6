//! Configuration loading.
//!
//! Loads the root [`Config`] from a TOML file or string, then expands any
//! `${VAR}` / `${VAR:-default}` references in path-shaped fields so a
//! deployment can point the criteria file or report directory at an
//! environment-provided location without templating the TOML itself.

pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Loads configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    load_config_str(&content)
}

/// Loads configuration from a TOML string.
pub fn load_config_str(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content).context("Failed to parse config")?;

    config.grading.criteria_path = expand_path(&config.grading.criteria_path)?;
    config.report.output_dir = expand_path(&config.report.output_dir)?;

    Ok(config)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    expand_env_value(&raw)
        .map(PathBuf::from)
        .map_err(|e| anyhow::anyhow!(e))
}

/// Expands environment variable references in a string value.
///
/// Syntax:
/// - `${VAR}` - required, fails if VAR is not set
/// - `${VAR:-default}` - optional, uses "default" if VAR not set
/// - `$$` - escaped dollar sign (becomes single `$`)
fn expand_env_value(value: &str) -> Result<String, String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    result.push('$');
                }
                Some('{') => {
                    chars.next();

                    let mut var_content = String::new();
                    let mut found_close = false;

                    for c in chars.by_ref() {
                        if c == '}' {
                            found_close = true;
                            break;
                        }
                        var_content.push(c);
                    }

                    if !found_close {
                        return Err(format!("Unclosed variable reference: ${{{var_content}"));
                    }

                    let (var_name, default_value) = if let Some(idx) = var_content.find(":-") {
                        let (name, rest) = var_content.split_at(idx);
                        (name, Some(&rest[2..]))
                    } else {
                        (var_content.as_str(), None)
                    };

                    if var_name.is_empty() {
                        return Err("Empty variable name in ${}".to_string());
                    }

                    match std::env::var(var_name) {
                        Ok(val) => result.push_str(&val),
                        Err(_) => {
                            if let Some(default) = default_value {
                                result.push_str(default);
                            } else {
                                return Err(format!("Required environment variable not set: {var_name}"));
                            }
                        }
                    }
                }
                _ => {
                    result.push('$');
                }
            }
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_value_no_variables() {
        assert_eq!(expand_env_value("hello world").unwrap(), "hello world");
    }

    #[test]
    fn expand_env_value_escaped_dollar() {
        assert_eq!(expand_env_value("price is $$100").unwrap(), "price is $100");
    }

    #[test]
    fn expand_env_value_unset_required_errors() {
        let result = expand_env_value("${_AUTOGRADER_TEST_NONEXISTENT_VAR}");
        assert!(result.is_err());
    }

    #[test]
    fn expand_env_value_default_used_when_unset() {
        assert_eq!(
            expand_env_value("${_AUTOGRADER_TEST_MISSING:-fallback}").unwrap(),
            "fallback"
        );
    }

    #[test]
    fn load_config_str_parses_minimal_document() {
        let config = load_config_str(
            r#"
            [grading]
            criteria_path = "criteria.toml"
            template_name = "default"

            [[sandbox_pools]]
            language = "python"
            pool_size = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.grading.template_name, "default");
        assert_eq!(config.sandbox_pools.len(), 1);
    }
}
