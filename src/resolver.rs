use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::db::models::Organization;
use crate::db::{DocumentStore, StoreError, ORGANIZATIONS};

/// A resolved lookup. `Absent` records a genuine not-found so the id is
/// never re-fetched within the session; transient failures are not cached.
#[derive(Clone, Debug)]
pub enum CacheEntry {
    Present(Organization),
    Absent,
}

/// Session-lifetime organization cache. Entries are never invalidated; a
/// fresh session starts cold. Injected into the resolver so tests can seed
/// or inspect it directly.
#[derive(Default)]
pub struct OrgCache {
    inner: Mutex<HashMap<String, CacheEntry>>,
}

impl OrgCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<CacheEntry> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn put(&self, id: &str, entry: CacheEntry) {
        self.inner.lock().unwrap().insert(id.to_string(), entry);
    }

    pub fn has(&self, id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(id)
    }
}

type InflightLookup = Shared<BoxFuture<'static, Option<Organization>>>;

/// Maps an `ngo_id` to its organization profile. Concurrent lookups for the
/// same id within one resolution pass share a single in-flight fetch: the
/// first caller issues it, later callers await the same future.
pub struct OrgResolver {
    store: Arc<dyn DocumentStore>,
    cache: Arc<OrgCache>,
    inflight: Mutex<HashMap<String, InflightLookup>>,
}

impl OrgResolver {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<OrgCache>) -> Self {
        OrgResolver {
            store,
            cache,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one organization id. `None` covers both a confirmed missing
    /// profile and a failed fetch; only the former is remembered.
    pub async fn resolve(&self, org_id: &str) -> Option<Organization> {
        match self.cache.get(org_id) {
            Some(CacheEntry::Present(org)) => return Some(org),
            Some(CacheEntry::Absent) => return None,
            None => {}
        }

        let lookup = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(org_id) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = fetch_and_cache(
                        Arc::clone(&self.store),
                        Arc::clone(&self.cache),
                        org_id.to_string(),
                    )
                    .boxed()
                    .shared();
                    inflight.insert(org_id.to_string(), fut.clone());
                    fut
                }
            }
        };

        let resolved = lookup.clone().await;

        let mut inflight = self.inflight.lock().unwrap();
        if inflight.get(org_id).is_some_and(|f| f.ptr_eq(&lookup)) {
            inflight.remove(org_id);
        }

        resolved
    }

    /// Record a freshly saved profile. Without this, an absent marker or a
    /// stale copy cached earlier in the session would outlive the write.
    pub fn put_profile(&self, org: Organization) {
        let id = org.id.clone();
        self.cache.put(&id, CacheEntry::Present(org));
    }

    /// Resolve a batch of distinct ids; M distinct ids cost exactly M
    /// fetches. Lookups run concurrently with no ordering dependency.
    pub async fn resolve_many(
        &self,
        org_ids: &HashSet<String>,
    ) -> HashMap<String, Option<Organization>> {
        let lookups = org_ids.iter().map(|id| async move {
            let resolved = self.resolve(id).await;
            (id.clone(), resolved)
        });
        futures::future::join_all(lookups).await.into_iter().collect()
    }
}

async fn fetch_and_cache(
    store: Arc<dyn DocumentStore>,
    cache: Arc<OrgCache>,
    org_id: String,
) -> Option<Organization> {
    match store.get_by_id(ORGANIZATIONS, &org_id).await {
        Ok(doc) => match serde_json::from_value::<Organization>(doc) {
            Ok(org) => {
                cache.put(&org_id, CacheEntry::Present(org.clone()));
                Some(org)
            }
            Err(e) => {
                // Malformed profile: treat as a failed fetch, retriable later.
                tracing::warn!("Malformed organization document {}: {}", org_id, e);
                None
            }
        },
        Err(StoreError::NotFound) => {
            cache.put(&org_id, CacheEntry::Absent);
            None
        }
        Err(e) => {
            tracing::warn!("Organization lookup failed for {}: {}", org_id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::OrgType;
    use crate::db::{Filter, SortKey};
    use async_trait::async_trait;
    use serde_json::Value;

    fn organization(id: &str) -> Organization {
        Organization {
            id: id.to_string(),
            name: format!("NGO {}", id),
            org_type: OrgType::Clinic,
            address: "12 Hill Rd".to_string(),
            city: "Pune".to_string(),
            description: "Community clinic".to_string(),
            contact_email: Some(format!("{}@example.org", id)),
            contact_phone: None,
            website: None,
            services: vec!["primary care".to_string()],
        }
    }

    async fn seed_org(store: &MemoryStore, org: &Organization) {
        let doc = serde_json::to_value(org).expect("serialize org");
        store.create(ORGANIZATIONS, &org.id, &doc).await.expect("seed org");
    }

    /// Delegates to a MemoryStore after a small delay so lookups are
    /// genuinely in flight when concurrent callers arrive.
    struct SlowStore {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl DocumentStore for SlowStore {
        async fn query(
            &self,
            collection: &str,
            filters: &[Filter],
            sort: &[SortKey],
            limit: Option<usize>,
        ) -> Result<Vec<Value>, StoreError> {
            self.inner.query(collection, filters, sort, limit).await
        }

        async fn get_by_id(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.inner.get_by_id(collection, id).await
        }

        async fn create(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
            self.inner.create(collection, id, doc).await
        }

        async fn update(&self, collection: &str, id: &str, doc: &Value) -> Result<(), StoreError> {
            self.inner.update(collection, id, doc).await
        }
    }

    #[tokio::test]
    async fn second_resolve_hits_cache() {
        let memory = Arc::new(MemoryStore::new());
        seed_org(&memory, &organization("ngo-1")).await;
        let resolver = OrgResolver::new(memory.clone(), Arc::new(OrgCache::new()));

        let first = resolver.resolve("ngo-1").await.expect("resolved");
        let second = resolver.resolve("ngo-1").await.expect("resolved");
        assert_eq!(first.name, second.name);
        assert_eq!(memory.fetches(ORGANIZATIONS, "ngo-1"), 1);
    }

    #[tokio::test]
    async fn confirmed_absent_is_cached() {
        let memory = Arc::new(MemoryStore::new());
        let resolver = OrgResolver::new(memory.clone(), Arc::new(OrgCache::new()));

        assert!(resolver.resolve("ghost").await.is_none());
        assert!(resolver.resolve("ghost").await.is_none());
        assert_eq!(memory.fetches(ORGANIZATIONS, "ghost"), 1);
    }

    #[tokio::test]
    async fn profile_save_overrides_absent_marker() {
        let memory = Arc::new(MemoryStore::new());
        let resolver = OrgResolver::new(memory.clone(), Arc::new(OrgCache::new()));

        // Browsing before the first profile save caches a confirmed absence.
        assert!(resolver.resolve("ngo-1").await.is_none());

        let org = organization("ngo-1");
        let doc = serde_json::to_value(&org).expect("serialize org");
        memory.create(ORGANIZATIONS, "ngo-1", &doc).await.expect("save profile");
        resolver.put_profile(org);

        let resolved = resolver.resolve("ngo-1").await.expect("profile visible after save");
        assert_eq!(resolved.name, "NGO ngo-1");
        // Served from the refreshed cache, not a second fetch.
        assert_eq!(memory.fetches(ORGANIZATIONS, "ngo-1"), 1);
    }

    #[tokio::test]
    async fn profile_edit_refreshes_cached_copy() {
        let memory = Arc::new(MemoryStore::new());
        seed_org(&memory, &organization("ngo-1")).await;
        let resolver = OrgResolver::new(memory.clone(), Arc::new(OrgCache::new()));

        assert_eq!(resolver.resolve("ngo-1").await.expect("resolved").name, "NGO ngo-1");

        let mut renamed = organization("ngo-1");
        renamed.name = "NGO ngo-1 (renamed)".to_string();
        let doc = serde_json::to_value(&renamed).expect("serialize org");
        memory.update(ORGANIZATIONS, "ngo-1", &doc).await.expect("rename profile");
        resolver.put_profile(renamed);

        let resolved = resolver.resolve("ngo-1").await.expect("resolved");
        assert_eq!(resolved.name, "NGO ngo-1 (renamed)");
    }

    #[tokio::test]
    async fn transient_failure_is_retried_not_cached() {
        let memory = Arc::new(MemoryStore::new());
        seed_org(&memory, &organization("ngo-1")).await;
        memory.fail_next_get("ngo-1", StoreError::Unavailable("timeout".to_string()));
        let resolver = OrgResolver::new(memory.clone(), Arc::new(OrgCache::new()));

        assert!(resolver.resolve("ngo-1").await.is_none());
        assert!(resolver.resolve("ngo-1").await.is_some());
        assert_eq!(memory.fetches(ORGANIZATIONS, "ngo-1"), 2);
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_fetch() {
        let memory = Arc::new(MemoryStore::new());
        seed_org(&memory, &organization("ngo-1")).await;
        let slow = Arc::new(SlowStore { inner: memory.clone() });
        let resolver = Arc::new(OrgResolver::new(slow, Arc::new(OrgCache::new())));

        let (a, b, c) = tokio::join!(
            resolver.resolve("ngo-1"),
            resolver.resolve("ngo-1"),
            resolver.resolve("ngo-1"),
        );
        assert!(a.is_some() && b.is_some() && c.is_some());
        assert_eq!(memory.fetches(ORGANIZATIONS, "ngo-1"), 1);
    }

    #[tokio::test]
    async fn batch_issues_one_fetch_per_distinct_id() {
        let memory = Arc::new(MemoryStore::new());
        seed_org(&memory, &organization("ngo-1")).await;
        seed_org(&memory, &organization("ngo-2")).await;
        let resolver = OrgResolver::new(memory.clone(), Arc::new(OrgCache::new()));

        // Five requests referencing two distinct organizations plus one
        // missing one.
        let ids: HashSet<String> = ["ngo-1", "ngo-2", "ngo-1", "ngo-1", "missing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolved = resolver.resolve_many(&ids).await;

        assert_eq!(resolved.len(), 3);
        assert!(resolved["ngo-1"].is_some());
        assert!(resolved["ngo-2"].is_some());
        assert!(resolved["missing"].is_none());
        assert_eq!(memory.fetches(ORGANIZATIONS, "ngo-1"), 1);
        assert_eq!(memory.fetches(ORGANIZATIONS, "ngo-2"), 1);
        assert_eq!(memory.fetches(ORGANIZATIONS, "missing"), 1);
    }
}
