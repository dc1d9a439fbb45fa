use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{DocumentStore, Filter, SortKey, StoreError};

/// In-memory document store. Backs development mode (no hosted store
/// configured) and the test suite, where its fetch counters and one-shot
/// failure injection make resolver and query behavior observable.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    get_counts: Mutex<HashMap<(String, String), usize>>,
    fail_next_query: Mutex<Option<StoreError>>,
    fail_next_get: Mutex<HashMap<String, StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of get_by_id calls issued for this document so far.
    pub fn fetches(&self, collection: &str, id: &str) -> usize {
        self.get_counts
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Make the next query on any collection fail with `err`.
    pub fn fail_next_query(&self, err: StoreError) {
        *self.fail_next_query.lock().unwrap() = Some(err);
    }

    /// Make the next get_by_id for `id` fail with `err`.
    pub fn fail_next_get(&self, id: &str, err: StoreError) {
        self.fail_next_get.lock().unwrap().insert(id.to_string(), err);
    }

    fn matches(doc: &Value, filters: &[Filter]) -> bool {
        filters
            .iter()
            .all(|f| doc.get(&f.field) == Some(&f.value))
    }

    fn compare_field(a: &Value, b: &Value, key: &SortKey) -> Ordering {
        let av = a.get(&key.field);
        let bv = b.get(&key.field);
        let ord = match (av, bv) {
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(Value::String(x)), Some(Value::String(y))) => Self::compare_strings(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            _ => Ordering::Equal,
        };
        if key.descending {
            ord.reverse()
        } else {
            ord
        }
    }

    /// Timestamps serialize as RFC3339 with variable-length fractional
    /// seconds, where byte order disagrees with time order ('Z' sorts after
    /// '.'). Compare parsed instants when both sides are timestamps.
    fn compare_strings(x: &str, y: &str) -> Ordering {
        match (
            chrono::DateTime::parse_from_rfc3339(x),
            chrono::DateTime::parse_from_rfc3339(y),
        ) {
            (Ok(dx), Ok(dy)) => dx.cmp(&dy),
            _ => x.cmp(y),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(err) = self.fail_next_query.lock().unwrap().take() {
            return Err(err);
        }

        let collections = self.collections.lock().unwrap();
        let mut docs: Vec<Value> = collections
            .get(collection)
            .map(|c| c.values().filter(|d| Self::matches(d, filters)).cloned().collect())
            .unwrap_or_default();

        docs.sort_by(|a, b| {
            sort.iter()
                .map(|key| Self::compare_field(a, b, key))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        if let Some(n) = limit {
            docs.truncate(n);
        }
        Ok(docs)
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        *self
            .get_counts
            .lock()
            .unwrap()
            .entry((collection.to_string(), id.to_string()))
            .or_insert(0) += 1;

        if let Some(err) = self.fail_next_get.lock().unwrap().remove(id) {
            return Err(err);
        }

        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().unwrap();
        let entry = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or(StoreError::NotFound)?;

        // Partial update: merge top-level fields into the stored document.
        if let (Value::Object(existing), Value::Object(patch)) = (entry, doc) {
            for (k, v) in patch {
                existing.insert(k.clone(), v.clone());
            }
            Ok(())
        } else {
            Err(StoreError::Unknown("update requires object documents".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subsecond_timestamps_sort_chronologically() {
        let store = MemoryStore::new();
        store
            .create("stories", "whole", &json!({ "created_at": "2026-08-01T12:00:00Z" }))
            .await
            .expect("create");
        store
            .create("stories", "frac", &json!({ "created_at": "2026-08-01T12:00:00.100Z" }))
            .await
            .expect("create");

        let sort = [SortKey {
            field: "created_at".to_string(),
            descending: true,
        }];
        let docs = store.query("stories", &[], &sort, None).await.expect("query");

        // The fractional-second timestamp is the later instant even though
        // it sorts earlier as bytes.
        assert_eq!(docs[0]["created_at"], "2026-08-01T12:00:00.100Z");
        assert_eq!(docs[1]["created_at"], "2026-08-01T12:00:00Z");
    }
}
