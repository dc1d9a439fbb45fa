use axum::{
    extract::{Json, Path, State},
    response::{IntoResponse, Json as AxumJson},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::db::models::{Organization, OrgType};
use crate::db::{StoreError, ORGANIZATIONS};
use crate::routes::ApiError;
use crate::AppState;

pub async fn get_organization(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    if !crate::auth::permissions(user.role()).browse_requests {
        return Err(ApiError::Forbidden("browsing is not permitted"));
    }

    let doc = state.store.get_by_id(ORGANIZATIONS, &id).await?;
    let org: Organization = serde_json::from_value(doc)
        .map_err(|e| StoreError::Unknown(format!("malformed organization {}: {}", id, e)))?;
    Ok(AxumJson(org))
}

#[derive(Deserialize)]
pub struct UpdateProfilePayload {
    pub name: String,
    pub org_type: OrgType,
    pub address: String,
    pub city: String,
    pub description: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

/// Owner-only profile edit; the profile id is the owning account id, so
/// the authenticated subject is the only possible target. Creates the
/// profile on first save.
pub async fn update_my_organization(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.permissions().edit_profile {
        return Err(ApiError::Forbidden("only organization accounts have a profile"));
    }

    let org = Organization {
        id: user.id.clone(),
        name: payload.name,
        org_type: payload.org_type,
        address: payload.address,
        city: payload.city,
        description: payload.description,
        contact_email: payload.contact_email,
        contact_phone: payload.contact_phone,
        website: payload.website,
        services: payload.services,
    };
    let doc = serde_json::to_value(&org)
        .map_err(|e| StoreError::Unknown(format!("serialize organization: {}", e)))?;

    match state.store.update(ORGANIZATIONS, &user.id, &doc).await {
        Ok(()) => {}
        Err(StoreError::NotFound) => state.store.create(ORGANIZATIONS, &user.id, &doc).await?,
        Err(e) => return Err(e.into()),
    }

    // Refresh the resolver so the saved profile is visible immediately,
    // even if this session already cached the id as absent.
    state.resolver.put_profile(org);

    Ok(AxumJson(json!({ "status": "updated", "id": user.id })))
}
