// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// max_parallel = 8
///
/// [default]
/// cpus = 1
/// mem_mb = 1024
///
/// [task.trim]
/// command = "scripts/trim -t {cpus} {inputs} {output}"
/// inputs = ["data/**/*.fastq.gz"]
/// output = "out/trim/all_trimmed.fastq.gz"
/// cpus = 8
///
/// [task.histogram]
/// command = "scripts/histogram {input} {output}"
/// from = ["trim"]
/// expand = "transform"
/// match = '.+/(?P<NAME>[^/]+)\.fastq\.gz'
/// output = "out/histogram/{NAME}.txt"
/// ```
///
/// All sections except `[task.<name>]` are optional and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour config from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Resource defaults from `[default]`.
    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`.
    ///
    /// Keys are the *task names* (e.g. `"trim"`, `"assemble"`).
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration.
///
/// Constructed only through `TryFrom<RawConfigFile>` (see `config::validate`),
/// so holding a `ConfigFile` means the task graph is acyclic, all `from`
/// references resolve, and every pattern/template pair is consistent.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    /// Used by `validate` after all checks have passed.
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        default: DefaultSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            default,
            task,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of task processes running at the same time.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_max_parallel() -> usize {
    4
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

/// `[default]` section: resource hints applied to tasks that do not override
/// them. The values are substituted into command templates and otherwise
/// passed through opaquely.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultSection {
    #[serde(default = "default_cpus")]
    pub cpus: u32,

    #[serde(default = "default_mem_mb")]
    pub mem_mb: u64,
}

fn default_cpus() -> u32 {
    1
}

fn default_mem_mb() -> u64 {
    1024
}

impl Default for DefaultSection {
    fn default() -> Self {
        Self {
            cpus: default_cpus(),
            mem_mb: default_mem_mb(),
        }
    }
}

/// How a task's resolved input file set expands into jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandMode {
    /// All inputs collapse into a single job.
    Merge,
    /// One job per matched input file.
    Transform,
    /// Inputs are grouped by the values of the `match` capture groups;
    /// one job per group.
    Collate,
}

impl Default for ExpandMode {
    fn default() -> Self {
        ExpandMode::Merge
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Command template. Placeholders: `{input}`, `{inputs}`, `{output}`,
    /// `{outputs}`, `{cpus}`, `{mem_mb}`, plus any named capture group from
    /// `match`.
    pub command: String,

    /// Glob patterns (relative to the project root) that seed this task's
    /// input file set.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Upstream tasks whose outputs feed this task. This is also what
    /// defines the edges of the task graph.
    #[serde(default)]
    pub from: Vec<String>,

    /// Regex with named capture groups, applied to each input path.
    /// Required for `expand = "transform"` and `expand = "collate"`.
    #[serde(default, rename = "match")]
    pub match_pattern: Option<String>,

    /// Expansion mode; defaults to `merge`.
    #[serde(default)]
    pub expand: ExpandMode,

    /// Single output path template. Mutually exclusive with `outputs`.
    #[serde(default)]
    pub output: Option<String>,

    /// Multiple output path templates. Mutually exclusive with `output`.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Per-task CPU hint; falls back to `[default].cpus`.
    #[serde(default)]
    pub cpus: Option<u32>,

    /// Per-task memory hint in MB; falls back to `[default].mem_mb`.
    #[serde(default)]
    pub mem_mb: Option<u64>,
}

impl TaskConfig {
    /// The declared output templates, regardless of which field was used.
    pub fn output_templates(&self) -> Vec<String> {
        match &self.output {
            Some(single) => vec![single.clone()],
            None => self.outputs.clone(),
        }
    }

    pub fn effective_cpus(&self, defaults: &DefaultSection) -> u32 {
        self.cpus.unwrap_or(defaults.cpus)
    }

    pub fn effective_mem_mb(&self, defaults: &DefaultSection) -> u64 {
        self.mem_mb.unwrap_or(defaults.mem_mb)
    }
}
