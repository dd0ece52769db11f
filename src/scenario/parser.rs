use std::collections::HashSet;
use std::path::Path;

use super::env::expand_env;
use super::models::{Action, Scenario, ValidationError, ValidationResult};
use crate::error::{AppError, Result};

/// Parse a scenario from a YAML string
pub fn parse_yaml(yaml_content: &str) -> Result<Scenario> {
    Ok(serde_yaml::from_str(yaml_content)?)
}

/// Parse a scenario from a file path
pub fn parse_file(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)?;
    parse_yaml(&content)
}

pub fn to_yaml(scenario: &Scenario) -> Result<String> {
    Ok(serde_yaml::to_string(scenario)?)
}

/// Write a scenario, creating parent directories as needed
pub fn save_file(scenario: &Scenario, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_yaml(scenario)?)?;
    tracing::info!("Saved scenario '{}' ({} steps) to {}", scenario.name, scenario.steps.len(), path.display());
    Ok(())
}

/// Read, expand `${VAR}` references, parse and validate in one go;
/// validation errors become `ValidationError`
pub fn load(path: &Path) -> Result<Scenario> {
    let expanded = expand_env(&std::fs::read_to_string(path)?)?;
    for name in &expanded.unresolved {
        tracing::warn!("{}: ${{{}}} is not set", path.display(), name);
    }
    let scenario = parse_yaml(&expanded.content)?;
    let result = validate(&scenario);
    for warning in &result.warnings {
        tracing::warn!("{}: {}", path.display(), warning);
    }
    if !result.valid {
        let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
        return Err(AppError::ValidationError(errors.join("; ")));
    }
    Ok(scenario)
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Validate a parsed scenario
pub fn validate(scenario: &Scenario) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if scenario.name.trim().is_empty() {
        errors.push(ValidationError {
            path: "name".to_string(),
            message: "Scenario name is required".to_string(),
        });
    }

    if scenario.steps.is_empty() {
        errors.push(ValidationError {
            path: "steps".to_string(),
            message: "At least one step is required".to_string(),
        });
    } else if !matches!(scenario.steps[0].action, Action::GoTo { .. }) {
        warnings.push("First step is not a go_to; replay starts on a blank page".to_string());
    }

    let mut screenshots = HashSet::new();
    for (i, step) in scenario.steps.iter().enumerate() {
        let path = |field: &str| format!("steps[{}].{}", i, field);
        match &step.action {
            Action::GoTo { url } => {
                if url.trim().is_empty() {
                    errors.push(ValidationError {
                        path: path("url"),
                        message: "URL is required".to_string(),
                    });
                } else if !url.contains("://") && !url.starts_with("about:") {
                    warnings.push(format!("{} has no scheme: '{}'", path("url"), url));
                }
            }
            Action::Click { text, selector } | Action::Submit { text, selector } => {
                if blank(text) && blank(selector) {
                    errors.push(ValidationError {
                        path: path("text"),
                        message: format!("{} needs text or selector", step.action.name()),
                    });
                }
            }
            Action::Type { field, selector, .. } => {
                if blank(field) && blank(selector) {
                    errors.push(ValidationError {
                        path: path("field"),
                        message: "type needs field or selector".to_string(),
                    });
                }
            }
            Action::Scroll { amount, .. } => {
                if *amount == 0 {
                    warnings.push(format!("{} is 0; the step does nothing", path("amount")));
                }
            }
            Action::Press { key } => {
                if key.trim().is_empty() {
                    errors.push(ValidationError {
                        path: path("key"),
                        message: "Key is required".to_string(),
                    });
                }
            }
            Action::Wait { seconds } => {
                if !seconds.is_finite() || *seconds < 0.0 {
                    errors.push(ValidationError {
                        path: path("seconds"),
                        message: format!("Invalid wait of {} seconds", seconds),
                    });
                }
            }
            Action::Screenshot { name } => {
                if let Some(name) = name {
                    if !screenshots.insert(name.as_str()) {
                        warnings.push(format!("{} reuses screenshot name '{}'", path("name"), name));
                    }
                }
            }
        }
    }

    if let Some(browser) = &scenario.config.browser {
        if browser.width == Some(0) || browser.height == Some(0) {
            errors.push(ValidationError {
                path: "config.browser".to_string(),
                message: "Viewport dimensions must be positive".to_string(),
            });
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}
