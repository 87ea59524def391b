use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::ValidationError;

/// Answers keyed by question id. The shape of each value depends on the question type
/// (text, a rating number, one or many selected options), so they are kept as raw JSON.
pub(crate) type Answers = Map<String, Value>;

/// One respondent's submitted answers to a survey
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SurveyResponse {
    #[serde(rename = "_id")]
    pub(crate) id: Arc<str>,
    pub(crate) survey_id: Arc<str>,
    pub(crate) answers: Answers,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) submitted_at: OffsetDateTime,
}

/// Request body for submitting a response
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewResponse {
    pub(crate) survey_id: Option<String>,
    pub(crate) answers: Option<Answers>,
}

impl NewResponse {
    /// Checks presence of the survey id and answers. The survey is not required to exist.
    pub(crate) fn into_survey_response(
        self,
        id: Arc<str>,
        now: OffsetDateTime,
    ) -> Result<SurveyResponse, ValidationError> {
        let (Some(survey_id), Some(answers)) = (self.survey_id, self.answers) else {
            return Err(ValidationError::MissingResponseFields);
        };

        if survey_id.is_empty() || answers.is_empty() {
            return Err(ValidationError::MissingResponseFields);
        }

        Ok(SurveyResponse {
            id,
            survey_id: survey_id.into(),
            answers,
            submitted_at: now,
        })
    }
}
