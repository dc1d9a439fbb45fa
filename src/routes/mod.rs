use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::db::StoreError;
use crate::requests::TransitionError;

pub mod offers;
pub mod organizations;
pub mod requests;
pub mod stories;

/// API-facing failure. Store categories map to distinct statuses and
/// guidance so a failed listing is never confused with an empty one, and
/// operator problems are never presented as retryable.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("contact details unavailable, retry")]
    ContactUnavailable,

    #[error("request is no longer open")]
    RequestNotOpen,
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::IndexMissing(_) | StoreError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::NotFound => StatusCode::NOT_FOUND,
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) => store_status(e),
            ApiError::Transition(TransitionError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Transition(TransitionError::Store(e)) => store_status(e),
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ContactUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RequestNotOpen => StatusCode::CONFLICT,
        }
    }

    fn retryable(&self) -> bool {
        match self {
            ApiError::Store(e) => e.is_retryable(),
            ApiError::Transition(TransitionError::Store(e)) => e.is_retryable(),
            ApiError::Transition(_) | ApiError::Forbidden(_) | ApiError::RequestNotOpen => false,
            ApiError::ContactUnavailable => true,
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            ApiError::Store(StoreError::IndexMissing(_))
            | ApiError::Transition(TransitionError::Store(StoreError::IndexMissing(_))) => {
                "The store is missing a required index; an administrator must create it."
            }
            ApiError::Store(StoreError::PermissionDenied(_))
            | ApiError::Transition(TransitionError::Store(StoreError::PermissionDenied(_))) => {
                "Access to the store was denied; check the service credentials."
            }
            ApiError::Store(StoreError::Unavailable(_))
            | ApiError::Transition(TransitionError::Store(StoreError::Unavailable(_))) => {
                "The store is temporarily unavailable; try again shortly."
            }
            ApiError::Store(StoreError::NotFound)
            | ApiError::Transition(TransitionError::Store(StoreError::NotFound)) => {
                "The record does not exist."
            }
            ApiError::Store(StoreError::Unknown(_))
            | ApiError::Transition(TransitionError::Store(StoreError::Unknown(_))) => {
                "Unexpected store failure."
            }
            ApiError::Transition(TransitionError::InvalidTransition { .. }) => {
                "The request lifecycle does not allow this change."
            }
            ApiError::Forbidden(_) => "Your role does not permit this action.",
            ApiError::ContactUnavailable => {
                "The organization's profile could not be loaded; try again."
            }
            ApiError::RequestNotOpen => "The request has already been fulfilled or closed.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::error!("API error ({}): {}", status, self);
        let body = serde_json::json!({
            "error": self.to_string(),
            "retryable": self.retryable(),
            "guidance": self.guidance(),
        });
        (status, Json(body)).into_response()
    }
}
