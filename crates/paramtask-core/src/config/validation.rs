//! Configuration validation

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ConfigError, ParamError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_options(config)?;
    validate_parser(config)?;
    validate_tasks(config)?;
    validate_compositions(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ParamError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
    .into()
}

fn validate_options(config: &Config) -> Result<()> {
    let options = &config.options;
    for (field, names) in [
        ("options.params_name", &options.params_name),
        ("options.callback_name", &options.callback_name),
    ] {
        if names.is_empty() {
            return Err(invalid(field, "at least one name is required"));
        }
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(invalid(field, "names cannot be empty"));
        }
    }

    if let Some(shared) = options
        .params_name
        .iter()
        .find(|n| options.callback_name.contains(n))
    {
        return Err(invalid(
            "options.callback_name",
            format!("'{shared}' is also a parameter name"),
        ));
    }

    Ok(())
}

fn validate_parser(config: &Config) -> Result<()> {
    for (key, values) in &config.parser.choices {
        if values.is_empty() {
            return Err(invalid(
                format!("parser.choices.{key}"),
                "at least one choice is required",
            ));
        }
    }
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    let parser = config.parser.parser();
    if !config.tasks.is_empty() {
        debug!(count = config.tasks.len(), "validating tasks");
    }
    for (name, task) in &config.tasks {
        if task.command.trim().is_empty() {
            return Err(invalid(
                format!("tasks.{name}.command"),
                "command cannot be empty",
            ));
        }
        if name.starts_with('-') || name.contains(char::is_whitespace) {
            return Err(invalid(
                format!("tasks.{name}"),
                "name cannot start with '-' or contain whitespace",
            ));
        }
        task.defaults_with(&parser)
            .map_err(|e| invalid(format!("tasks.{name}.params"), e.to_string()))?;
    }
    Ok(())
}

fn validate_compositions(config: &Config) -> Result<()> {
    let parser = config.parser.parser();
    for (name, composition) in &config.compositions {
        if config.tasks.contains_key(name) {
            return Err(invalid(
                format!("compositions.{name}"),
                "name is already used by a task",
            ));
        }
        if composition.tasks.is_empty() {
            return Err(invalid(
                format!("compositions.{name}.tasks"),
                "at least one member is required",
            ));
        }
        if let Some(unknown) = composition.tasks.iter().find(|m| !config.defines(m)) {
            return Err(invalid(
                format!("compositions.{name}.tasks"),
                format!("unknown task '{unknown}'"),
            ));
        }
        composition
            .overrides_with(&parser)
            .map_err(|e| invalid(format!("compositions.{name}.params"), e.to_string()))?;
    }

    for name in config.compositions.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = find_cycle(config, name, &mut path, &mut HashSet::new()) {
            return Err(invalid(
                format!("compositions.{name}"),
                format!("cycle detected: {}", cycle.join(" -> ")),
            ));
        }
    }
    Ok(())
}

/// Depth-first walk of composition members; returns the cyclic path if any
fn find_cycle<'a>(
    config: &'a Config,
    name: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|n| *n == name) {
        let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(name.to_string());
        return Some(cycle);
    }
    if done.contains(name) {
        return None;
    }
    let composition = config.compositions.get(name)?;

    path.push(name);
    for member in &composition.tasks {
        if let Some(cycle) = find_cycle(config, member, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(name);
    None
}
