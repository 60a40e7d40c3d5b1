use std::sync::OnceLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Failure while substituting `{{ env.NAME }}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("environment variable `{name}` is not set (line {line})")]
    Missing { name: String, line: usize },
    #[error("placeholder `{key}` on line {line} must be scoped with `env.`")]
    Unscoped { key: String, line: usize },
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*([A-Za-z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
    })
}

/// Substitute `{{ env.NAME }}` and `{{ env.NAME | default("x") }}` in raw TOML
///
/// Comment lines are copied through untouched so that commented-out
/// settings never require their variables to exist.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut expanded = Vec::new();

    for (index, line) in input.split('\n').enumerate() {
        if line.trim_start().starts_with('#') {
            expanded.push(line.to_owned());
            continue;
        }

        expanded.push(expand_line(line, index + 1)?);
    }

    Ok(expanded.join("\n"))
}

fn expand_line(line: &str, line_no: usize) -> Result<String, ExpandError> {
    let mut failure = None;

    let replaced = placeholder().replace_all(line, |caps: &Captures<'_>| {
        match resolve(caps, line_no) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(replaced.into_owned()),
    }
}

fn resolve(caps: &Captures<'_>, line: usize) -> Result<String, ExpandError> {
    let key = &caps[1];
    let fallback = caps.get(2).map(|m| m.as_str());

    let Some(name) = key.strip_prefix("env.").filter(|name| !name.contains('.')) else {
        return Err(ExpandError::Unscoped {
            key: key.to_owned(),
            line,
        });
    };

    match (std::env::var(name), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(fallback)) => Ok(fallback.to_owned()),
        (Err(_), None) => Err(ExpandError::Missing {
            name: name.to_owned(),
            line,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "[providers.local]\ntype = \"ollama\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_variables() {
        temp_env::with_vars([("PRISM_KEY", Some("sk-1")), ("PRISM_URL", Some("http://gpu:11434"))], || {
            let result = expand_env("api_key = \"{{ env.PRISM_KEY }}\"\nbase_url = \"{{env.PRISM_URL}}\"").unwrap();
            assert_eq!(result, "api_key = \"sk-1\"\nbase_url = \"http://gpu:11434\"");
        });
    }

    #[test]
    fn missing_variable_reports_line() {
        temp_env::with_var_unset("PRISM_ABSENT", || {
            let err = expand_env("a = 1\nkey = \"{{ env.PRISM_ABSENT }}\"").unwrap_err();
            assert_eq!(
                err,
                ExpandError::Missing {
                    name: "PRISM_ABSENT".to_owned(),
                    line: 2
                }
            );
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("PRISM_OPTIONAL", || {
            let result = expand_env("key = \"{{ env.PRISM_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"fallback\"");
        });

        temp_env::with_var("PRISM_OPTIONAL", Some("actual"), || {
            let result = expand_env("key = \"{{ env.PRISM_OPTIONAL | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"actual\"");
        });
    }

    #[test]
    fn empty_default_is_allowed() {
        temp_env::with_var_unset("PRISM_OPTIONAL", || {
            let result = expand_env("key = \"{{ env.PRISM_OPTIONAL | default(\"\") }}\"").unwrap();
            assert_eq!(result, "key = \"\"");
        });
    }

    #[test]
    fn unscoped_placeholder_is_rejected() {
        let err = expand_env("key = \"{{ vault.KEY }}\"").unwrap_err();
        assert!(matches!(err, ExpandError::Unscoped { ref key, line: 1 } if key == "vault.KEY"));
    }

    #[test]
    fn comments_skip_expansion() {
        temp_env::with_var_unset("PRISM_ABSENT", || {
            let input = "  # api_key = \"{{ env.PRISM_ABSENT }}\"\n";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
