use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Json as AxumJson},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthenticatedUser, MaybeUser};
use crate::db::models::ImpactStory;
use crate::db::{SortKey, StoreError, STORIES};
use crate::routes::ApiError;
use crate::AppState;

pub async fn list_stories(
    State(state): State<AppState>,
    user: MaybeUser,
) -> Result<impl IntoResponse, ApiError> {
    if !crate::auth::permissions(user.role()).browse_requests {
        return Err(ApiError::Forbidden("browsing is not permitted"));
    }

    let sort = [SortKey {
        field: "created_at".to_string(),
        descending: true,
    }];
    let docs = state.store.query(STORIES, &[], &sort, None).await?;

    let mut stories: Vec<ImpactStory> = Vec::with_capacity(docs.len());
    for doc in docs {
        match serde_json::from_value::<ImpactStory>(doc) {
            Ok(story) => stories.push(story),
            Err(e) => tracing::warn!("Skipping malformed impact story: {}", e),
        }
    }

    Ok(AxumJson(json!({ "stories": stories })))
}

#[derive(Deserialize)]
pub struct CreateStoryPayload {
    pub title: String,
    pub story_content: String,
    pub image_url: Option<String>,
}

/// Stories are append-only; there is no update or delete path.
pub async fn create_story(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateStoryPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if !user.permissions().post_stories {
        return Err(ApiError::Forbidden("only organizations can share stories"));
    }

    let profile = state
        .resolver
        .resolve(&user.id)
        .await
        .ok_or(ApiError::Forbidden("complete your organization profile first"))?;

    let story = ImpactStory {
        id: Uuid::new_v4().to_string(),
        ngo_id: user.id,
        ngo_name: profile.name,
        title: payload.title,
        story_content: payload.story_content,
        image_url: payload.image_url,
        created_at: Utc::now(),
    };
    let doc = serde_json::to_value(&story)
        .map_err(|e| StoreError::Unknown(format!("serialize impact story: {}", e)))?;
    state.store.create(STORIES, &story.id, &doc).await?;

    Ok((
        StatusCode::CREATED,
        AxumJson(json!({ "status": "created", "id": story.id })),
    ))
}
