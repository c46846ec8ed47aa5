//! Configuration management for the insights engine.
//!
//! Loads configuration from TOML and provides defaults matching the host
//! application's current API paths and DOM layout. Everything that tends to
//! drift when the host site changes (endpoint path, id patterns, selectors)
//! lives here rather than in the components.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub interceptor: InterceptorConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub presenter: PresenterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether the engine attaches at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Host + path substrings of pages the engine attaches to
    #[serde(default = "default_page_patterns")]
    pub page_patterns: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: default_log_level(),
            page_patterns: default_page_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorConfig {
    /// Substring of the request URL that marks a harvestable response
    #[serde(default = "default_endpoint_signature")]
    pub endpoint_signature: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            endpoint_signature: default_endpoint_signature(),
        }
    }
}

/// One identifier pattern rule. The first capture group is the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRule {
    pub name: String,
    pub pattern: String,
}

impl IdRule {
    pub fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Ordered rules; earlier rules win
    #[serde(default = "default_rules")]
    pub rules: Vec<IdRule>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Attributes that carry the job id directly, in lookup order
    #[serde(default = "default_id_attributes")]
    pub id_attributes: Vec<String>,

    /// Classes that mark a job card container
    #[serde(default = "default_card_classes")]
    pub card_classes: Vec<String>,

    /// Substring of a link target that marks a job view link
    #[serde(default = "default_job_link_marker")]
    pub job_link_marker: String,

    /// Delay after a card click before resolving the id
    #[serde(default = "default_click_settle")]
    pub click_settle_ms: u64,

    /// Delay after a location change before resolving the id
    #[serde(default = "default_navigation_settle")]
    pub navigation_settle_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            id_attributes: default_id_attributes(),
            card_classes: default_card_classes(),
            job_link_marker: default_job_link_marker(),
            click_settle_ms: default_click_settle(),
            navigation_settle_ms: default_navigation_settle(),
        }
    }
}

impl WatcherConfig {
    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenterConfig {
    /// How long a panel stays up without interaction
    #[serde(default = "default_auto_dismiss")]
    pub auto_dismiss_ms: u64,

    /// Selectors of the detail pane the panel is aligned to, tried together
    #[serde(default = "default_anchor_selectors")]
    pub anchor_selectors: Vec<String>,

    /// Gap kept between the panel and the anchor / viewport edges
    #[serde(default = "default_margin")]
    pub margin_px: f64,

    /// chrono format string for timestamps; the host locale decides when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,

    /// Fixed offset applied with `date_format`; host local time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_ms: default_auto_dismiss(),
            anchor_selectors: default_anchor_selectors(),
            margin_px: default_margin(),
            date_format: None,
            utc_offset_minutes: None,
        }
    }
}

impl PresenterConfig {
    pub fn auto_dismiss(&self) -> Duration {
        Duration::from_millis(self.auto_dismiss_ms)
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_patterns() -> Vec<String> {
    vec!["linkedin.com/jobs".to_string()]
}

fn default_endpoint_signature() -> String {
    "voyager/api/jobs/jobPostings".to_string()
}

fn default_rules() -> Vec<IdRule> {
    vec![
        IdRule::new("view-path", r"/jobs/view/(\d+)"),
        IdRule::new("current-job-query", r"currentJobId=(\d+)"),
        IdRule::new("entity-urn", r"urn:li:[A-Za-z_]*[jJ]obPosting:(\d+)"),
        IdRule::new("posting-field", r"jobPostingId[=:](\d+)"),
        IdRule::new("posting-json", r#""jobPostingId":"(\d+)""#),
    ]
}

fn default_id_attributes() -> Vec<String> {
    vec![
        "data-job-id".to_string(),
        "data-occludable-job-id".to_string(),
    ]
}

fn default_card_classes() -> Vec<String> {
    vec![
        "jobs-search-results__list-item".to_string(),
        "job-card-container".to_string(),
    ]
}

fn default_job_link_marker() -> String {
    "/jobs/view/".to_string()
}

fn default_click_settle() -> u64 {
    500
}

fn default_navigation_settle() -> u64 {
    1000
}

fn default_auto_dismiss() -> u64 {
    10_000
}

fn default_anchor_selectors() -> Vec<String> {
    vec![
        ".jobs-details".to_string(),
        ".job-view-layout".to_string(),
        ".jobs-search__job-details".to_string(),
    ]
}

fn default_margin() -> f64 {
    20.0
}

impl Config {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("job-insights")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Whether the engine should attach to the page at `page_url`.
    ///
    /// Patterns are matched against host + path only, so a query string
    /// mentioning the pattern does not count.
    pub fn applies_to(&self, page_url: &str) -> bool {
        if !self.general.enabled {
            return false;
        }

        let Ok(parsed) = url::Url::parse(page_url) else {
            return false;
        };
        let location = format!("{}{}", parsed.host_str().unwrap_or(""), parsed.path());

        self.general
            .page_patterns
            .iter()
            .any(|pattern| location.contains(pattern.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.general.enabled);
        assert_eq!(
            config.interceptor.endpoint_signature,
            "voyager/api/jobs/jobPostings"
        );
        assert_eq!(config.watcher.click_settle(), Duration::from_millis(500));
        assert_eq!(config.watcher.navigation_settle(), Duration::from_secs(1));
        assert_eq!(config.presenter.auto_dismiss(), Duration::from_secs(10));
        assert_eq!(config.presenter.date_format, None);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.ends_with("job-insights/config.toml"));
    }

    #[test]
    fn test_default_rule_order() {
        let config = Config::default();
        let names: Vec<_> = config
            .extraction
            .rules
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "view-path",
                "current-job-query",
                "entity-urn",
                "posting-field",
                "posting-json"
            ]
        );
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[interceptor]
endpoint_signature = "voyager/api/graphql"

[extraction]
rules = [{ name = "slug", pattern = "/jobs/([0-9]+)/" }]

[presenter]
auto_dismiss_ms = 3000
date_format = "%Y-%m-%d %H:%M"
utc_offset_minutes = 60
"#;

        let config = Config::from_toml_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.interceptor.endpoint_signature, "voyager/api/graphql");
        assert_eq!(config.extraction.rules, vec![IdRule::new("slug", "/jobs/([0-9]+)/")]);
        assert_eq!(config.presenter.auto_dismiss_ms, 3000);
        assert_eq!(config.presenter.date_format.as_deref(), Some("%Y-%m-%d %H:%M"));
        assert_eq!(config.presenter.utc_offset_minutes, Some(60));
        // untouched sections keep defaults
        assert_eq!(config.watcher.job_link_marker, "/jobs/view/");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.watcher.click_settle_ms = 250;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(path);
        assert_eq!(loaded.watcher.click_settle_ms, 250);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watcher\nclick_settle_ms = ").unwrap();

        let loaded = Config::load_from_path(path);
        assert_eq!(loaded.watcher.click_settle_ms, 500);
    }

    #[test]
    fn test_applies_to_job_pages_only() {
        let config = Config::default();
        assert!(config.applies_to("https://www.linkedin.com/jobs/view/123/"));
        assert!(config.applies_to("https://www.linkedin.com/jobs/search/?keywords=rust"));
        assert!(!config.applies_to("https://www.linkedin.com/feed/"));
        assert!(!config.applies_to("https://example.com/?next=linkedin.com/jobs"));
        assert!(!config.applies_to("not a url"));
    }

    #[test]
    fn test_disabled_config_applies_nowhere() {
        let mut config = Config::default();
        config.general.enabled = false;
        assert!(!config.applies_to("https://www.linkedin.com/jobs/view/123/"));
    }
}
