use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    id,
    survey::{NewSurvey, Survey, SurveyUpdate},
    AppState,
};

use super::{
    envelope::{Data, Message},
    error::ApiError,
    route_not_found,
};

pub(crate) fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/surveys",
            get(get_surveys).post(create_survey).fallback(route_not_found),
        )
        .route(
            "/api/surveys/active",
            get(get_active_surveys).fallback(route_not_found),
        )
        .route(
            "/api/surveys/:id",
            get(get_survey)
                .put(update_survey)
                .delete(delete_survey)
                .fallback(route_not_found),
        )
        .route(
            "/api/surveys/:id/responses",
            get(get_survey_responses).fallback(route_not_found),
        )
        .route(
            "/api/surveys/:id/analytics",
            get(get_survey_analytics).fallback(route_not_found),
        )
}

/// The `:id` path segment of a survey route, checked to be a well formed id
struct SurveyId(String);

#[async_trait]
impl<S> FromRequestParts<S> for SurveyId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(survey_id) = Path::<String>::from_request_parts(parts, state).await?;
        id::parse(&survey_id)?;

        Ok(Self(survey_id))
    }
}

async fn get_surveys(State(state): State<AppState>) -> Result<Data<Vec<Survey>>, ApiError> {
    let surveys = state.database.get_surveys().await?;
    Ok(Data::new(surveys))
}

async fn get_active_surveys(
    State(state): State<AppState>,
) -> Result<Data<Vec<Survey>>, ApiError> {
    let surveys = state.database.get_active_surveys().await?;
    Ok(Data::new(surveys))
}

async fn get_survey(
    State(state): State<AppState>,
    SurveyId(survey_id): SurveyId,
) -> Result<Data<Survey>, ApiError> {
    let survey = state
        .database
        .get_survey(&survey_id)
        .await?
        .ok_or(ApiError::SurveyNotFound)?;

    Ok(Data::new(survey))
}

async fn create_survey(
    State(state): State<AppState>,
    body: Result<Json<NewSurvey>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(new_survey) = body?;

    let survey = new_survey.into_survey(id::generate(), OffsetDateTime::now_utc())?;
    state.database.insert_survey(&survey).await?;

    tracing::debug!(
        "Created survey {} with {} questions",
        survey.id,
        survey.questions.len()
    );
    Ok((StatusCode::CREATED, Data::new(survey)))
}

/// A missing or blank body is an update without fields that only refreshes the update time.
/// A body that is present must be a JSON object, the content type is not checked.
fn read_update(body: &[u8]) -> Result<SurveyUpdate, JsonRejection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SurveyUpdate::default());
    }

    let Json(update) = Json::from_bytes(body)?;
    Ok(update)
}

async fn update_survey(
    State(state): State<AppState>,
    SurveyId(survey_id): SurveyId,
    body: Bytes,
) -> Result<Data<Survey>, ApiError> {
    let update = read_update(&body)?;
    update.validate()?;

    let survey = state
        .database
        .update_survey(&survey_id, &update, OffsetDateTime::now_utc())
        .await?
        .ok_or(ApiError::SurveyNotFound)?;

    tracing::debug!("Updated survey {}", survey.id);
    Ok(Data::new(survey))
}

/// Deletes the survey and then its responses.
/// The two deletes are independent: if the second one fails the survey is gone and its
/// responses remain as orphans. Deleting an unknown survey still succeeds.
async fn delete_survey(
    State(state): State<AppState>,
    SurveyId(survey_id): SurveyId,
) -> Result<Message, ApiError> {
    let deleted_surveys = state.database.delete_survey(&survey_id).await?;
    let deleted_responses = state.database.delete_survey_responses(&survey_id).await?;

    tracing::debug!(
        "Deleted {} survey(s) and {} response(s) for survey {}",
        deleted_surveys,
        deleted_responses,
        survey_id
    );
    Ok(Message::success("Survey deleted"))
}

async fn get_survey_responses(
    State(state): State<AppState>,
    SurveyId(survey_id): SurveyId,
) -> Result<impl IntoResponse, ApiError> {
    let responses = state.database.get_survey_responses(&survey_id).await?;
    Ok(Data::counted(responses))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Analytics {
    total_responses: u64,
    survey: Survey,
}

async fn get_survey_analytics(
    State(state): State<AppState>,
    SurveyId(survey_id): SurveyId,
) -> Result<Data<Analytics>, ApiError> {
    let survey = state
        .database
        .get_survey(&survey_id)
        .await?
        .ok_or(ApiError::SurveyNotFound)?;

    let total_responses = state.database.count_survey_responses(&survey_id).await?;

    Ok(Data::new(Analytics {
        total_responses,
        survey,
    }))
}
