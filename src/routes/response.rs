use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;

use crate::{id, survey::response::NewResponse, AppState};

use super::{envelope::Data, error::ApiError, route_not_found};

pub(crate) fn create_router() -> Router<AppState> {
    Router::new().route(
        "/api/responses",
        post(create_response).fallback(route_not_found),
    )
}

/// Stores a response without checking that the survey exists
async fn create_response(
    State(state): State<AppState>,
    body: Result<Json<NewResponse>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(new_response) = body?;

    let response = new_response.into_survey_response(id::generate(), OffsetDateTime::now_utc())?;
    id::parse(&response.survey_id)?;

    state.database.insert_response(&response).await?;

    tracing::debug!(
        "Stored response {} for survey {}",
        response.id,
        response.survey_id
    );
    Ok((StatusCode::CREATED, Data::new(response)))
}
