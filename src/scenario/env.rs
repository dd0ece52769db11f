use regex::Regex;

use crate::error::{AppError, Result};

const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Scenario text with `${VAR}` references substituted
#[derive(Debug, Clone, PartialEq)]
pub struct Expanded {
    pub content: String,
    /// Referenced names with no value; left in place
    pub unresolved: Vec<String>,
}

/// Substitute `${VAR}` references so secrets and hosts stay out of
/// scenario files
pub fn expand_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Expanded> {
    let re = Regex::new(ENV_REFERENCE).map_err(|e| AppError::Internal(e.into()))?;
    let mut unresolved = Vec::new();

    let content = re
        .replace_all(input, |caps: &regex::Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    if !unresolved.iter().any(|n| n == name) {
                        unresolved.push(name.to_string());
                    }
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    Ok(Expanded { content, unresolved })
}

/// [`expand_vars`] against the process environment
pub fn expand_env(input: &str) -> Result<Expanded> {
    expand_vars(input, |name| std::env::var(name).ok())
}
