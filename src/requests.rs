use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::db::models::{DonationRequest, RequestStatus};
use crate::db::{DocumentStore, Filter, SortKey, StoreError, REQUESTS};

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("no transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fetch all open donation requests, most urgent first, newest first within
/// an urgency tier. An empty marketplace is an empty Ok, not an error.
///
/// Urgency is stored as a label, so the store cannot produce the compound
/// order natively; we ask it for recency order and apply the two-key
/// comparator client-side. The sort is stable, preserving store order on
/// full ties.
pub async fn list_open_requests(
    store: &dyn DocumentStore,
) -> Result<Vec<DonationRequest>, StoreError> {
    let filters = [Filter::eq("status", "Open")];
    let sort = [SortKey {
        field: "created_at".to_string(),
        descending: true,
    }];

    let docs = store.query(REQUESTS, &filters, &sort, None).await?;

    let mut requests: Vec<DonationRequest> = Vec::with_capacity(docs.len());
    for doc in docs {
        match serde_json::from_value::<DonationRequest>(doc) {
            Ok(req) => requests.push(req),
            Err(e) => tracing::warn!("Skipping malformed donation request document: {}", e),
        }
    }

    requests.sort_by(|a, b| {
        a.urgency
            .rank()
            .cmp(&b.urgency.rank())
            .then_with(|| b.created_at.cmp(&a.created_at))
    });

    Ok(requests)
}

pub async fn get_request(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<DonationRequest, StoreError> {
    let doc = store.get_by_id(REQUESTS, id).await?;
    serde_json::from_value(doc)
        .map_err(|e| StoreError::Unknown(format!("malformed donation request {}: {}", id, e)))
}

pub async fn create_request(
    store: &dyn DocumentStore,
    request: &DonationRequest,
) -> Result<(), StoreError> {
    let doc = serde_json::to_value(request)
        .map_err(|e| StoreError::Unknown(format!("serialize donation request: {}", e)))?;
    store.create(REQUESTS, &request.id, &doc).await
}

/// Apply a lifecycle transition. Open requests move to Fulfilled or Closed;
/// both are terminal, so anything already terminal is rejected.
pub async fn transition_request(
    store: &dyn DocumentStore,
    id: &str,
    to: RequestStatus,
) -> Result<DonationRequest, TransitionError> {
    let mut request = get_request(store, id).await?;

    if request.status.is_terminal() || to == RequestStatus::Open {
        return Err(TransitionError::InvalidTransition {
            from: request.status.as_str(),
            to: to.as_str(),
        });
    }

    let now = Utc::now();
    let patch = json!({
        "status": to,
        "updated_at": now,
    });
    store.update(REQUESTS, id, &patch).await?;

    request.status = to;
    request.updated_at = now;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::Urgency;
    use chrono::{Duration, Utc};

    fn request(id: &str, urgency: Urgency, status: RequestStatus, age_hours: i64) -> DonationRequest {
        let created = Utc::now() - Duration::hours(age_hours);
        DonationRequest {
            id: id.to_string(),
            ngo_id: format!("ngo-{}", id),
            ngo_name: "City Relief".to_string(),
            medicine_name: "Amoxicillin".to_string(),
            description: "500mg capsules".to_string(),
            quantity_needed: 100,
            urgency,
            status,
            notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    async fn seed(store: &MemoryStore, requests: &[DonationRequest]) {
        for r in requests {
            create_request(store, r).await.expect("seed request");
        }
    }

    #[tokio::test]
    async fn orders_by_urgency_then_recency() {
        let store = MemoryStore::new();
        // [Low, High, Medium] created at T, T+1, T+2.
        seed(
            &store,
            &[
                request("a", Urgency::Low, RequestStatus::Open, 3),
                request("b", Urgency::High, RequestStatus::Open, 2),
                request("c", Urgency::Medium, RequestStatus::Open, 1),
            ],
        )
        .await;

        let listed = list_open_requests(&store).await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn newest_first_within_same_urgency() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                request("old", Urgency::High, RequestStatus::Open, 48),
                request("new", Urgency::High, RequestStatus::Open, 1),
                request("mid", Urgency::High, RequestStatus::Open, 24),
            ],
        )
        .await;

        let listed = list_open_requests(&store).await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn full_ties_keep_store_order() {
        let store = MemoryStore::new();
        let created = Utc::now();
        let mut first = request("a", Urgency::Medium, RequestStatus::Open, 0);
        let mut second = request("b", Urgency::Medium, RequestStatus::Open, 0);
        first.created_at = created;
        first.updated_at = created;
        second.created_at = created;
        second.updated_at = created;
        seed(&store, &[first, second]).await;

        // Equal on both sort keys: the stable sort must not swap them.
        let listed = list_open_requests(&store).await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn excludes_non_open_requests() {
        let store = MemoryStore::new();
        seed(
            &store,
            &[
                request("open", Urgency::Medium, RequestStatus::Open, 1),
                request("done", Urgency::High, RequestStatus::Fulfilled, 1),
                request("gone", Urgency::High, RequestStatus::Closed, 1),
            ],
        )
        .await;

        let listed = list_open_requests(&store).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "open");
    }

    #[tokio::test]
    async fn empty_marketplace_is_ok_not_error() {
        let store = MemoryStore::new();
        let listed = list_open_requests(&store).await.expect("list");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn index_missing_surfaces_as_error() {
        let store = MemoryStore::new();
        seed(&store, &[request("a", Urgency::High, RequestStatus::Open, 1)]).await;
        store.fail_next_query(StoreError::IndexMissing("needs composite index".to_string()));

        let err = list_open_requests(&store).await.expect_err("must not be empty success");
        assert!(matches!(err, StoreError::IndexMissing(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn fulfill_then_close_is_rejected() {
        let store = MemoryStore::new();
        seed(&store, &[request("a", Urgency::High, RequestStatus::Open, 1)]).await;

        let fulfilled = transition_request(&store, "a", RequestStatus::Fulfilled)
            .await
            .expect("open -> fulfilled");
        assert_eq!(fulfilled.status, RequestStatus::Fulfilled);

        let err = transition_request(&store, "a", RequestStatus::Closed)
            .await
            .expect_err("fulfilled is terminal");
        assert!(matches!(err, TransitionError::InvalidTransition { from: "Fulfilled", .. }));
    }

    #[tokio::test]
    async fn reopening_is_rejected() {
        let store = MemoryStore::new();
        seed(&store, &[request("a", Urgency::Low, RequestStatus::Open, 1)]).await;

        let err = transition_request(&store, "a", RequestStatus::Open)
            .await
            .expect_err("no transition to Open");
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
    }
}
