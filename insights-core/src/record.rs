//! Job posting record types

use crate::config::PresenterConfig;
use crate::error::ConfigError;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Placeholder shown for any absent metric
pub const NOT_AVAILABLE: &str = "N/A";

/// Normalized job posting metric snapshot.
///
/// Records are replaced wholesale on re-harvest, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_listed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl Record {
    /// A record carrying only its id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            listed_at: None,
            expire_at: None,
            original_listed_at: None,
            view_count: None,
            application_count: None,
            title: None,
            company: None,
        }
    }
}

/// Convert an epoch-millisecond value to a timestamp.
///
/// Zero and negative values are the host's way of saying "unknown".
pub fn timestamp_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    DateTime::from_timestamp_millis(millis)
}

/// Render an optional timestamp, `N/A` when absent
pub fn format_timestamp(
    value: Option<DateTime<Utc>>,
    render: impl FnOnce(DateTime<Utc>) -> String,
) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), render)
}

/// Render an optional count, `N/A` when absent
pub fn format_count(value: Option<u64>) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| v.to_string())
}

/// Explicit timestamp pattern. Without one the host's locale decides.
#[derive(Debug, Clone, Default)]
pub struct DisplayFormat {
    pattern: Option<String>,
    offset: Option<FixedOffset>,
}

impl DisplayFormat {
    /// Validate a chrono pattern and offset. `utc_offset_minutes` of `None`
    /// means the host's local time zone.
    pub fn new(pattern: Option<&str>, utc_offset_minutes: Option<i32>) -> Result<Self, ConfigError> {
        if let Some(pattern) = pattern {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(ConfigError::InvalidDateFormat(pattern.to_string()));
            }
        }

        let offset = match utc_offset_minutes {
            Some(minutes) => Some(
                minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or(ConfigError::InvalidUtcOffset(minutes))?,
            ),
            None => None,
        };

        Ok(Self {
            pattern: pattern.map(str::to_string),
            offset,
        })
    }

    pub fn from_config(config: &PresenterConfig) -> Result<Self, ConfigError> {
        Self::new(config.date_format.as_deref(), config.utc_offset_minutes)
    }

    /// Whether rendering is left to the host locale
    pub fn is_locale(&self) -> bool {
        self.pattern.is_none()
    }

    /// Render with the configured pattern; `None` when there is no pattern or
    /// it cannot be rendered for this instant
    pub fn render(&self, at: DateTime<Utc>) -> Option<String> {
        let pattern = self.pattern.as_deref()?;
        let mut out = String::new();
        let written = match self.offset {
            Some(offset) => write!(out, "{}", at.with_timezone(&offset).format(pattern)),
            None => write!(out, "{}", at.with_timezone(&Local).format(pattern)),
        };
        written.ok().map(|_| out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_negative_are_absent() {
        assert_eq!(timestamp_from_millis(0), None);
        assert_eq!(timestamp_from_millis(-5), None);
        assert!(timestamp_from_millis(1_700_000_000_000).is_some());
    }

    #[test]
    fn test_format_fixed_offset() {
        let format = DisplayFormat::new(Some("%-m/%-d/%Y %H:%M"), Some(0)).unwrap();
        let ts = timestamp_from_millis(1_700_000_000_000).unwrap();
        assert_eq!(format.render(ts).as_deref(), Some("11/14/2023 22:13"));

        let format = DisplayFormat::new(Some("%Y-%m-%d %H:%M"), Some(120)).unwrap();
        assert_eq!(format.render(ts).as_deref(), Some("2023-11-15 00:13"));
    }

    #[test]
    fn test_no_pattern_defers_to_host_locale() {
        let format = DisplayFormat::new(None, None).unwrap();
        let ts = timestamp_from_millis(1_700_000_000_000).unwrap();
        assert!(format.is_locale());
        assert_eq!(format.render(ts), None);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = DisplayFormat::new(Some("%Y-%Q"), Some(0));
        assert!(matches!(result, Err(ConfigError::InvalidDateFormat(p)) if p == "%Y-%Q"));
    }

    #[test]
    fn test_out_of_range_offset_rejected() {
        assert!(matches!(
            DisplayFormat::new(None, Some(i32::MAX)),
            Err(ConfigError::InvalidUtcOffset(i32::MAX))
        ));
        // a day or more is not a valid offset either
        assert!(matches!(
            DisplayFormat::new(None, Some(24 * 60)),
            Err(ConfigError::InvalidUtcOffset(1440))
        ));
        assert!(DisplayFormat::new(None, Some(-12 * 60)).is_ok());
    }

    #[test]
    fn test_absent_values_render_placeholder() {
        assert_eq!(format_timestamp(None, |_| unreachable!()), NOT_AVAILABLE);
        assert_eq!(format_count(None), NOT_AVAILABLE);
        assert_eq!(format_count(Some(0)), "0");
        assert_eq!(format_count(Some(1234)), "1234");
    }

    #[test]
    fn test_serialized_field_names() {
        let mut record = Record::new("42");
        record.view_count = Some(10);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({ "id": "42", "viewCount": 10 }));
    }
}
