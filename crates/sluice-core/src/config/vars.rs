//! Environment variable interpolation for config files.
//!
//! Connection strings and credentials are usually injected through the
//! environment, so every config file is interpolated before parsing:
//! - `$VAR` or `${VAR}`: substitute, error if unset
//! - `${VAR:-default}`: default if unset or empty
//! - `${VAR-default}`: default only if unset
//! - `$$`: literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape
        |
        \$\{
            (?P<braced>[A-Za-z_][A-Za-z0-9_]*)
            (?:
                (?P<op>:?-)
                (?P<default>[^}]*)
            )?
        \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("interpolation pattern is a valid regex")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every problem found; all are collected so missing variables are
    /// reported together.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Resolve a single match to its replacement text.
fn resolve(caps: &Captures) -> Result<String, String> {
    let whole = &caps[0];
    if whole == "$$" {
        return Ok("$".to_string());
    }

    let name = caps
        .name("braced")
        .or_else(|| caps.name("bare"))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let op = caps.name("op").map(|m| m.as_str());
    let default = caps.name("default").map(|m| m.as_str());

    match env::var(name) {
        Ok(value) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        Ok(value) if value.is_empty() && op == Some(":-") => {
            Ok(default.unwrap_or_default().to_string())
        }
        Ok(value) => Ok(value),
        Err(_) => default
            .map(str::to_string)
            .ok_or_else(|| format!("environment variable '{name}' is not set")),
    }
}

/// Interpolate environment variables in the given text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| match resolve(caps) {
            Ok(replacement) => replacement,
            Err(message) => {
                errors.push(message);
                caps[0].to_string()
            }
        })
        .into_owned();

    InterpolationResult { text, errors }
}
