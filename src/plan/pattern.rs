// src/plan/pattern.rs

//! Capture patterns: regexes with named groups applied to input paths.
//!
//! A task's `match` pattern is matched against each input path (with
//! forward slashes, regardless of platform). The named groups parameterize
//! the task's output templates and command, and serve as the grouping key
//! for `expand = "collate"`.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct CapturePattern {
    regex: Regex,
    raw: String,
}

impl CapturePattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex =
            Regex::new(pattern).with_context(|| format!("invalid capture pattern: {pattern}"))?;
        Ok(Self {
            regex,
            raw: pattern.to_string(),
        })
    }

    /// The pattern source, for error messages.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Names of all named capture groups, in declaration order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.regex.capture_names().flatten()
    }

    /// Match the pattern against a path and return the named capture values,
    /// or `None` if the path does not match.
    ///
    /// Groups that participate in the pattern but did not capture (e.g. in an
    /// unused alternation branch) are omitted from the map.
    pub fn captures(&self, path: &Path) -> Option<BTreeMap<String, String>> {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let caps = self.regex.captures(&normalized)?;

        let mut values = BTreeMap::new();
        for name in self.regex.capture_names().flatten() {
            if let Some(m) = caps.name(name) {
                values.insert(name.to_string(), m.as_str().to_string());
            }
        }
        Some(values)
    }
}
