use std::collections::HashSet;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::db::models::{DonationRequest, Organization, RequestStatus, Urgency};
use crate::requests;
use crate::routes::ApiError;
use crate::AppState;

/// One row of the marketplace listing: the request plus its resolved
/// organization. `contact_available` gates the offer action in the view;
/// an unresolved profile leaves the row visible but blocks contacting.
#[derive(Serialize)]
pub struct RequestListing {
    #[serde(flatten)]
    pub request: DonationRequest,
    pub organization: Option<Organization>,
    pub contact_available: bool,
}

pub async fn list_requests(
    State(state): State<AppState>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    if !crate::auth::permissions(user.role()).browse_requests {
        return Err(ApiError::Forbidden("browsing requests is not permitted"));
    }

    let open = requests::list_open_requests(state.store.as_ref()).await?;

    let ngo_ids: HashSet<String> = open.iter().map(|r| r.ngo_id.clone()).collect();
    let resolved = state.resolver.resolve_many(&ngo_ids).await;

    let listings: Vec<RequestListing> = open
        .into_iter()
        .map(|request| {
            let organization = resolved.get(&request.ngo_id).and_then(|o| o.clone());
            let contact_available = organization.is_some();
            RequestListing {
                request,
                organization,
                contact_available,
            }
        })
        .collect();

    Ok(AxumJson(json!({ "requests": listings })))
}

#[derive(Deserialize)]
pub struct CreateRequestPayload {
    pub medicine_name: String,
    pub description: String,
    pub quantity_needed: u32,
    pub urgency: Urgency,
    pub notes: Option<String>,
}

pub async fn create_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRequestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.permissions().create_requests {
        return Err(ApiError::Forbidden("only organizations can post requests"));
    }

    // The owning profile supplies the denormalized name.
    let profile = state
        .resolver
        .resolve(&user.id)
        .await
        .ok_or(ApiError::Forbidden("complete your organization profile first"))?;

    let now = Utc::now();
    let request = DonationRequest {
        id: Uuid::new_v4().to_string(),
        ngo_id: user.id,
        ngo_name: profile.name,
        medicine_name: payload.medicine_name,
        description: payload.description,
        quantity_needed: payload.quantity_needed,
        urgency: payload.urgency,
        status: RequestStatus::Open,
        notes: payload.notes,
        created_at: now,
        updated_at: now,
    };

    requests::create_request(state.store.as_ref(), &request).await?;

    Ok((
        StatusCode::CREATED,
        AxumJson(json!({ "status": "created", "id": request.id })),
    ))
}

pub async fn fulfill_request(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    transition(state, user, &id, RequestStatus::Fulfilled).await
}

pub async fn close_request(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    transition(state, user, &id, RequestStatus::Closed).await
}

async fn transition(
    state: AppState,
    user: AuthenticatedUser,
    id: &str,
    to: RequestStatus,
) -> Result<axum::response::Response, ApiError> {
    if !user.permissions().transition_requests {
        return Err(ApiError::Forbidden("only organizations can update requests"));
    }

    let existing = requests::get_request(state.store.as_ref(), id).await?;
    if existing.ngo_id != user.id {
        return Err(ApiError::Forbidden("requests can only be updated by their owner"));
    }

    let updated = requests::transition_request(state.store.as_ref(), id, to).await?;
    Ok((
        StatusCode::OK,
        AxumJson(json!({ "status": updated.status, "id": updated.id })),
    )
        .into_response())
}
