//! Session record cache

use crate::record::Record;
use std::cell::RefCell;
use std::collections::HashMap;

/// In-memory id → record map for the current page session.
///
/// Shared by reference between the interceptor (sole writer) and the presenter
/// (reader). Everything runs on the page's single thread, so interior
/// mutability through `RefCell` is enough; no borrow is ever held across a
/// call out of this type.
#[derive(Default)]
pub struct RecordCache {
    entries: RefCell<HashMap<String, Record>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or fully replace the entry for `record.id`
    pub fn put(&self, record: Record) {
        self.entries.borrow_mut().insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.entries.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.borrow().contains_key(id)
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_put_then_get() {
        let cache = RecordCache::new();
        let mut record = Record::new("123");
        record.view_count = Some(5);
        record.listed_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());

        cache.put(record.clone());

        assert_eq!(cache.get("123"), Some(record));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss() {
        let cache = RecordCache::new();
        assert_eq!(cache.get("nope"), None);
        assert!(!cache.contains("nope"));
    }

    #[test]
    fn test_second_put_replaces_without_merging() {
        let cache = RecordCache::new();

        let mut first = Record::new("7");
        first.view_count = Some(10);
        first.application_count = Some(3);
        first.title = Some("Engineer".to_string());
        cache.put(first);

        let mut second = Record::new("7");
        second.view_count = Some(11);
        cache.put(second.clone());

        let stored = cache.get("7").unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.application_count, None);
        assert_eq!(stored.title, None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = RecordCache::new();
        cache.put(Record::new("1"));
        cache.put(Record::new("2"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get("1"), None);
    }
}
