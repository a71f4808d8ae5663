//! Group key to strategy lookup, built once from configuration.

use regex::Regex;
use std::collections::HashMap;

use crate::config::GroupStrategy;
use crate::error::{CorpusError, Result};

/// Compiled per-group strategies.
///
/// Group keys are compared case-insensitively, since repository ids come back
/// from the database in lowercase while hand-written files may not be.
#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    patterns: HashMap<String, Regex>,
    subjects: HashMap<String, Vec<String>>,
}

impl StrategyRegistry {
    pub fn from_groups(groups: &HashMap<String, GroupStrategy>) -> Result<Self> {
        let mut registry = Self::default();
        for (group, strategy) in groups {
            if let Some(pattern) = &strategy.pattern {
                let compiled = compile_pattern(pattern).map_err(|e| {
                    CorpusError::ConfigurationError(format!("group {group}: {e}"))
                })?;
                registry.patterns.insert(group.to_lowercase(), compiled);
            }
            if !strategy.subjects.is_empty() {
                registry
                    .subjects
                    .insert(group.to_lowercase(), strategy.subjects.clone());
            }
        }
        Ok(registry)
    }

    pub fn with_pattern(mut self, group: &str, pattern: &str) -> Result<Self> {
        self.patterns
            .insert(group.to_lowercase(), compile_pattern(pattern)?);
        Ok(self)
    }

    pub fn with_subjects<I, S>(mut self, group: &str, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects.insert(
            group.to_lowercase(),
            subjects.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn pattern(&self, group: &str) -> Option<&Regex> {
        self.patterns.get(&group.to_lowercase())
    }

    pub fn subjects(&self, group: &str) -> Option<&[String]> {
        self.subjects.get(&group.to_lowercase()).map(Vec::as_slice)
    }

    /// Groups with an identifier pattern, sorted
    pub fn pattern_groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.patterns.keys().map(String::as_str).collect();
        groups.sort_unstable();
        groups
    }

    /// Groups with a subject mapping, sorted
    pub fn subject_groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.subjects.keys().map(String::as_str).collect();
        groups.sort_unstable();
        groups
    }
}

/// Patterns match from the start of the value, like an anchored match
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{pattern})"))?)
}
