#![allow(dead_code)]

use pipedag::config::{
    ConfigFile, ConfigSection, DefaultSection, ExpandMode, RawConfigFile, TaskConfig,
};
use std::collections::BTreeMap;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_parallel(mut self, n: usize) -> Self {
        self.config.config.max_parallel = n;
        self
    }

    pub fn with_default_cpus(mut self, cpus: u32) -> Self {
        self.config.default.cpus = cpus;
        self
    }

    pub fn with_default_mem_mb(mut self, mem_mb: u64) -> Self {
        self.config.default.mem_mb = mem_mb;
        self
    }

    /// Build and validate; panics on invalid configs, which is what tests
    /// want for fixtures.
    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    /// Build without validating, for tests that exercise validation errors.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            task: TaskConfig {
                command: command.to_string(),
                inputs: vec![],
                from: vec![],
                match_pattern: None,
                expand: ExpandMode::Merge,
                output: None,
                outputs: vec![],
                cpus: None,
                mem_mb: None,
            },
        }
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.task.inputs.push(pattern.to_string());
        self
    }

    pub fn from(mut self, upstream: &str) -> Self {
        self.task.from.push(upstream.to_string());
        self
    }

    pub fn match_pattern(mut self, pattern: &str) -> Self {
        self.task.match_pattern = Some(pattern.to_string());
        self
    }

    pub fn expand(mut self, mode: ExpandMode) -> Self {
        self.task.expand = mode;
        self
    }

    pub fn output(mut self, template: &str) -> Self {
        self.task.output = Some(template.to_string());
        self
    }

    pub fn outputs(mut self, templates: &[&str]) -> Self {
        self.task.outputs = templates.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn cpus(mut self, cpus: u32) -> Self {
        self.task.cpus = Some(cpus);
        self
    }

    pub fn mem_mb(mut self, mem_mb: u64) -> Self {
        self.task.mem_mb = Some(mem_mb);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
