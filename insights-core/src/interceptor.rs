//! Harvesting job records from intercepted data-fetch responses.
//!
//! The fetch wrapper itself lives in the host; this side only decides which
//! responses are interesting and turns their bodies into [`Record`]s. Nothing
//! here may fail loudly: a body we cannot make sense of is logged and dropped
//! so the host page never notices we were there.

use crate::cache::RecordCache;
use crate::config::InterceptorConfig;
use crate::error::HarvestError;
use crate::extractor::IdExtractor;
use crate::host::{InterceptedResponse, ResponseObserver};
use crate::record::{timestamp_from_millis, Record};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Outcome of one harvested body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    /// Raw entries found in the payload
    pub entries: usize,
    /// Records written to the cache
    pub stored: usize,
}

pub struct Interceptor {
    config: InterceptorConfig,
    cache: Rc<RecordCache>,
    extractor: Rc<IdExtractor>,
}

impl Interceptor {
    pub fn new(
        config: InterceptorConfig,
        cache: Rc<RecordCache>,
        extractor: Rc<IdExtractor>,
    ) -> Self {
        Self {
            config,
            cache,
            extractor,
        }
    }

    /// Whether a request URL carries harvestable payloads
    pub fn matches(&self, url: &str) -> bool {
        !self.config.endpoint_signature.is_empty()
            && url.contains(self.config.endpoint_signature.as_str())
    }

    /// Decode a response body and store every record it yields
    pub fn harvest_body(&self, body: &str) -> Result<HarvestReport, HarvestError> {
        let payload: Value = serde_json::from_str(body)?;
        self.harvest(&payload)
    }

    /// Store every record found in an already-decoded payload
    pub fn harvest(&self, payload: &Value) -> Result<HarvestReport, HarvestError> {
        let entries = job_entries(payload).ok_or(HarvestError::UnrecognizedShape)?;

        let records: Vec<Record> = entries
            .iter()
            .filter_map(|entry| self.build_record(entry))
            .collect();
        let stored = records.len();

        for record in records {
            self.cache.put(record);
        }

        info!(
            "Processed {} jobs. Total stored: {}",
            entries.len(),
            self.cache.len()
        );

        Ok(HarvestReport {
            entries: entries.len(),
            stored,
        })
    }

    /// Normalize one raw entry; entries without a recoverable id are skipped
    fn build_record(&self, entry: &Value) -> Option<Record> {
        let id = self.entry_id(entry)?;

        Some(Record {
            id,
            listed_at: timestamp_field(entry, "listedAt"),
            expire_at: timestamp_field(entry, "expireAt"),
            original_listed_at: timestamp_field(entry, "originalListedAt"),
            view_count: count_field(entry, "views"),
            application_count: count_field(entry, "applies"),
            title: text_field(entry.get("title")),
            company: text_field(entry.pointer("/companyDetails/companyResolutionResult/name")),
        })
    }

    fn entry_id(&self, entry: &Value) -> Option<String> {
        match entry.get("jobPostingId") {
            Some(Value::String(id)) if !id.is_empty() => return Some(id.clone()),
            Some(Value::Number(id)) => return Some(id.to_string()),
            _ => {}
        }

        entry
            .get("entityUrn")
            .and_then(Value::as_str)
            .and_then(|urn| self.extractor.extract(urn))
    }
}

impl ResponseObserver for Interceptor {
    fn wants(&self, url: &str) -> bool {
        self.matches(url)
    }

    fn observe(&self, response: InterceptedResponse) {
        if !response.ok {
            debug!("Skipping non-ok response from {}", response.url);
            return;
        }

        if let Err(e) = self.harvest_body(&response.body) {
            warn!("Error processing job data from {}: {}", response.url, e);
        }
    }
}

/// Locate the list of raw job entries in a payload.
///
/// Shapes are tried in order: `elements`, `data.elements`, a bare list, and a
/// single entry carrying `jobPostingId`.
fn job_entries(payload: &Value) -> Option<Vec<&Value>> {
    if let Some(elements) = payload.get("elements").and_then(Value::as_array) {
        return Some(elements.iter().collect());
    }

    if let Some(elements) = payload.pointer("/data/elements").and_then(Value::as_array) {
        return Some(elements.iter().collect());
    }

    if let Some(list) = payload.as_array() {
        return Some(list.iter().collect());
    }

    if payload.get("jobPostingId").is_some() {
        return Some(vec![payload]);
    }

    None
}

/// Epoch-millisecond field given as a number or a numeric string
fn timestamp_field(entry: &Value, key: &str) -> Option<DateTime<Utc>> {
    let millis = match entry.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    timestamp_from_millis(millis)
}

fn count_field(entry: &Value, key: &str) -> Option<u64> {
    match entry.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn interceptor() -> (Interceptor, Rc<RecordCache>) {
        let cache = Rc::new(RecordCache::new());
        let extractor = Rc::new(IdExtractor::from_config(&ExtractionConfig::default()).unwrap());
        let interceptor =
            Interceptor::new(InterceptorConfig::default(), Rc::clone(&cache), extractor);
        (interceptor, cache)
    }

    #[test]
    fn test_elements_payload() {
        let (interceptor, cache) = interceptor();
        let payload = json!({
            "elements": [{ "jobPostingId": "42", "listedAt": 1700000000000u64, "views": 10 }]
        });

        let report = interceptor.harvest(&payload).unwrap();
        assert_eq!(report, HarvestReport { entries: 1, stored: 1 });

        let record = cache.get("42").unwrap();
        assert_eq!(record.view_count, Some(10));
        assert_eq!(
            record.listed_at,
            Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
        );
        assert_eq!(record.expire_at, None);
        assert_eq!(record.application_count, None);
    }

    #[test]
    fn test_nested_data_elements() {
        let (interceptor, cache) = interceptor();
        let payload = json!({
            "data": { "elements": [
                { "jobPostingId": 1, "applies": 3 },
                { "jobPostingId": "2", "applies": "4" }
            ]}
        });

        interceptor.harvest(&payload).unwrap();
        assert_eq!(cache.get("1").unwrap().application_count, Some(3));
        assert_eq!(cache.get("2").unwrap().application_count, Some(4));
    }

    #[test]
    fn test_bare_list_and_single_entry() {
        let (interceptor, cache) = interceptor();

        interceptor
            .harvest(&json!([{ "jobPostingId": "10" }, { "jobPostingId": "11" }]))
            .unwrap();
        interceptor
            .harvest(&json!({ "jobPostingId": "12", "expireAt": "1700000000000" }))
            .unwrap();

        assert_eq!(cache.len(), 3);
        assert!(cache.get("12").unwrap().expire_at.is_some());
    }

    #[test]
    fn test_entity_urn_fallback() {
        let (interceptor, cache) = interceptor();
        let payload = json!({
            "elements": [
                { "entityUrn": "urn:li:fsd_jobPosting:3795291370", "views": 7 },
                { "entityUrn": "urn:li:company:1234" },
                { "views": 99 }
            ]
        });

        let report = interceptor.harvest(&payload).unwrap();
        assert_eq!(report, HarvestReport { entries: 3, stored: 1 });
        assert_eq!(cache.get("3795291370").unwrap().view_count, Some(7));
    }

    #[test]
    fn test_rich_fields() {
        let (interceptor, cache) = interceptor();
        let payload = json!({
            "jobPostingId": "5",
            "title": "  Rust Engineer ",
            "originalListedAt": 1690000000000u64,
            "listedAt": 0,
            "companyDetails": { "companyResolutionResult": { "name": "Acme" } }
        });

        interceptor.harvest(&payload).unwrap();
        let record = cache.get("5").unwrap();
        assert_eq!(record.title.as_deref(), Some("Rust Engineer"));
        assert_eq!(record.company.as_deref(), Some("Acme"));
        assert!(record.original_listed_at.is_some());
        assert_eq!(record.listed_at, None);
    }

    #[test]
    fn test_unrecognized_shape_leaves_cache_untouched() {
        let (interceptor, cache) = interceptor();

        let result = interceptor.harvest(&json!({ "paging": { "count": 10 } }));
        assert!(matches!(result, Err(HarvestError::UnrecognizedShape)));

        interceptor.observe(InterceptedResponse {
            url: "https://x/voyager/api/jobs/jobPostings/1".to_string(),
            ok: true,
            body: r#"{"included": []}"#.to_string(),
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_body_is_swallowed() {
        let (interceptor, cache) = interceptor();

        assert!(matches!(
            interceptor.harvest_body("<html>"),
            Err(HarvestError::Decode(_))
        ));

        interceptor.observe(InterceptedResponse {
            url: "https://x/voyager/api/jobs/jobPostings/1".to_string(),
            ok: true,
            body: "{not json".to_string(),
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_non_ok_response_ignored() {
        let (interceptor, cache) = interceptor();
        interceptor.observe(InterceptedResponse {
            url: "https://x/voyager/api/jobs/jobPostings/1".to_string(),
            ok: false,
            body: r#"{"jobPostingId":"1"}"#.to_string(),
        });
        assert!(cache.is_empty());
    }

    #[test]
    fn test_endpoint_matching() {
        let (interceptor, _) = interceptor();
        assert!(interceptor.wants("https://www.linkedin.com/voyager/api/jobs/jobPostings/123?x=1"));
        assert!(!interceptor.wants("https://www.linkedin.com/voyager/api/feed/updates"));
    }
}
