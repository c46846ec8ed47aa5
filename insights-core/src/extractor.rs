//! Job id extraction from URLs and free-text blobs.
//!
//! Rules are data: an ordered list of regexes whose first capture group is the
//! id. Structural rules come first so that a generic field pattern never wins
//! over a path or query match on the same string.

use crate::config::{ExtractionConfig, IdRule};
use crate::error::ConfigError;
use regex::Regex;
use tracing::trace;

struct CompiledRule {
    name: String,
    regex: Regex,
}

/// Ordered set of compiled identifier rules
pub struct IdExtractor {
    rules: Vec<CompiledRule>,
}

impl IdExtractor {
    /// Compile the given rules, preserving their order
    pub fn new(rules: &[IdRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex =
                    Regex::new(&rule.pattern).map_err(|source| ConfigError::InvalidPattern {
                        name: rule.name.clone(),
                        source,
                    })?;

                if regex.captures_len() < 2 {
                    return Err(ConfigError::MissingCapture(rule.name.clone()));
                }

                Ok(CompiledRule {
                    name: rule.name.clone(),
                    regex,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        Self::new(&config.rules)
    }

    /// Return the id captured by the first matching rule
    pub fn extract(&self, input: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            let id = rule.regex.captures(input)?.get(1)?.as_str();
            if id.is_empty() {
                return None;
            }
            trace!("Rule '{}' matched id {}", rule.name, id);
            Some(id.to_string())
        })
    }

    /// Name of the rule that would match, for diagnostics
    pub fn matching_rule(&self, input: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| rule.regex.is_match(input))
            .map(|rule| rule.name.as_str())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
