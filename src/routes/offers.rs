use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json as AxumJson},
};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::db::models::RequestStatus;
use crate::offer::{self, ContactBundle};
use crate::requests;
use crate::routes::ApiError;
use crate::AppState;

#[derive(Serialize)]
pub struct OfferResponse {
    pub organization_name: String,
    pub contact: ContactBundle,
    /// Best-effort draft; `None` when the generation collaborator failed.
    pub suggested_message: Option<String>,
}

/// Offer-contact workflow: resolve the owning organization and hand the
/// donor its contact details plus a drafted outreach message. An unresolved
/// profile blocks the action with a recoverable error; a failed draft does
/// not block the contact details.
pub async fn offer_contact(
    Path(id): Path<String>,
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    if !user.permissions().make_offers {
        return Err(ApiError::Forbidden("only donors can make offers"));
    }

    let request = requests::get_request(state.store.as_ref(), &id).await?;
    if request.status != RequestStatus::Open {
        return Err(ApiError::RequestNotOpen);
    }

    let organization = state
        .resolver
        .resolve(&request.ngo_id)
        .await
        .ok_or(ApiError::ContactUnavailable)?;

    let contact = offer::prepare_offer(&request, &organization);
    let suggested_message = offer::draft_outreach_message(
        state.text_gen.as_ref(),
        &organization.name,
        &request.medicine_name,
    )
    .await;

    Ok(AxumJson(OfferResponse {
        organization_name: organization.name,
        contact,
        suggested_message,
    }))
}
