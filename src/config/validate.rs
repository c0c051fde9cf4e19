// src/config/validate.rs

use crate::config::model::{ConfigFile, ExpandMode, RawConfigFile, TaskConfig};
use crate::dag::TaskGraph;
use crate::errors::{PipedagError, Result};
use crate::plan::pattern::CapturePattern;
use crate::plan::template;

/// Placeholders always available in command templates, independent of any
/// capture pattern.
const BUILTIN_COMMAND_VARS: &[&str] = &["input", "inputs", "output", "outputs", "cpus", "mem_mb"];

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.default, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    for (name, task) in cfg.task.iter() {
        validate_task(name, task)?;
    }
    validate_upstream_references(cfg)?;
    validate_graph(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipedagError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_parallel == 0 {
        return Err(PipedagError::ConfigError(
            "[config].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task(name: &str, task: &TaskConfig) -> Result<()> {
    if task.command.trim().is_empty() {
        return Err(PipedagError::ConfigError(format!(
            "task '{}' has an empty command",
            name
        )));
    }

    if task.output.is_some() && !task.outputs.is_empty() {
        return Err(PipedagError::ConfigError(format!(
            "task '{}' declares both `output` and `outputs`; use one",
            name
        )));
    }

    let templates = task.output_templates();
    if templates.is_empty() {
        return Err(PipedagError::ConfigError(format!(
            "task '{}' declares no output (set `output` or `outputs`)",
            name
        )));
    }

    let capture_names = validate_pattern(name, task)?;

    if matches!(task.expand, ExpandMode::Transform | ExpandMode::Collate)
        && task.inputs.is_empty()
        && task.from.is_empty()
    {
        return Err(PipedagError::ConfigError(format!(
            "task '{}' uses expand = \"{:?}\" but declares no inputs (set `inputs` or `from`)",
            name, task.expand
        )));
    }

    validate_output_templates(name, task, &templates, &capture_names)?;
    validate_command_template(name, task, &capture_names)?;

    Ok(())
}

/// Check `match` / `expand` consistency and return the capture group names
/// (empty for merge tasks).
fn validate_pattern(name: &str, task: &TaskConfig) -> Result<Vec<String>> {
    match (&task.match_pattern, task.expand) {
        (None, ExpandMode::Merge) => Ok(Vec::new()),
        (None, mode) => Err(PipedagError::ConfigError(format!(
            "task '{}' uses expand = \"{:?}\" but has no `match` pattern",
            name, mode
        ))),
        (Some(_), ExpandMode::Merge) => Err(PipedagError::ConfigError(format!(
            "task '{}' has a `match` pattern but expand = \"merge\"; use \"transform\" or \"collate\"",
            name
        ))),
        (Some(pattern), mode) => {
            let compiled = CapturePattern::new(pattern).map_err(|e| {
                PipedagError::ConfigError(format!(
                    "task '{}' has an invalid `match` pattern: {}",
                    name, e
                ))
            })?;

            let names: Vec<String> = compiled.group_names().map(|s| s.to_string()).collect();

            if mode == ExpandMode::Collate && names.is_empty() {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' uses expand = \"collate\" but `match` has no named capture groups to key on",
                    name
                )));
            }

            Ok(names)
        }
    }
}

fn validate_output_templates(
    name: &str,
    task: &TaskConfig,
    templates: &[String],
    capture_names: &[String],
) -> Result<()> {
    for tpl in templates {
        for placeholder in template::placeholders(tpl) {
            if !capture_names.iter().any(|c| c == &placeholder) {
                let detail = if task.match_pattern.is_some() {
                    "not a capture group of its `match` pattern"
                } else {
                    "the task has no `match` pattern"
                };
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' output template '{}' uses {{{}}} but {}",
                    name, tpl, placeholder, detail
                )));
            }
        }
    }
    Ok(())
}

fn validate_command_template(name: &str, task: &TaskConfig, capture_names: &[String]) -> Result<()> {
    for placeholder in template::placeholders(&task.command) {
        let builtin = BUILTIN_COMMAND_VARS.contains(&placeholder.as_str());
        let capture = capture_names.iter().any(|c| c == &placeholder);
        if !builtin && !capture {
            return Err(PipedagError::ConfigError(format!(
                "task '{}' command uses unknown placeholder {{{}}}",
                name, placeholder
            )));
        }
    }
    Ok(())
}

fn validate_upstream_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.from.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' has unknown upstream task '{}' in `from`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(PipedagError::ConfigError(format!(
                    "task '{}' cannot consume its own outputs in `from`",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Build the task graph through its checked API so that cycles surface as
/// [`PipedagError::Cycle`] at load time.
fn validate_graph(cfg: &RawConfigFile) -> Result<()> {
    let mut graph = TaskGraph::new();

    for name in cfg.task.keys() {
        graph.add_task(name)?;
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.from.iter() {
            graph.add_dependency(name, dep)?;
        }
    }

    Ok(())
}
