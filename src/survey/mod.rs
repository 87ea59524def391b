use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub(crate) mod response;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub(crate) enum ValidationError {
    #[error("Title and questions required")]
    MissingTitleOrQuestions,
    #[error("Question text required")]
    MissingQuestionText,
    #[error("Required fields missing")]
    MissingResponseFields,
}

/// The kind of answer a question expects
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum QuestionType {
    MultipleChoice,
    Checkbox,
    Text,
    Rating,
}

/// A single prompt embedded in a survey. Questions are not addressable on their own.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct Question {
    /// Caller supplied, used as the key for answers in responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub(crate) kind: Option<QuestionType>,
    #[serde(default)]
    pub(crate) question: String,
    /// Only meaningful for multiple choice and checkbox questions
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) required: Option<bool>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Survey {
    #[serde(rename = "_id")]
    pub(crate) id: Arc<str>,
    pub(crate) title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) questions: Vec<Question>,
    pub(crate) is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) updated_at: OffsetDateTime,
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn validate_questions(questions: &[Question]) -> Result<(), ValidationError> {
    if questions.is_empty() {
        return Err(ValidationError::MissingTitleOrQuestions);
    }

    if questions.iter().any(|question| is_blank(&question.question)) {
        return Err(ValidationError::MissingQuestionText);
    }

    Ok(())
}

/// Request body for creating a survey
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewSurvey {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) questions: Option<Vec<Question>>,
    pub(crate) is_active: Option<bool>,
}

impl NewSurvey {
    /// Checks the required fields and turns the request into a survey that can be stored
    pub(crate) fn into_survey(
        self,
        id: Arc<str>,
        now: OffsetDateTime,
    ) -> Result<Survey, ValidationError> {
        let (Some(title), Some(questions)) = (self.title, self.questions) else {
            return Err(ValidationError::MissingTitleOrQuestions);
        };

        if is_blank(&title) {
            return Err(ValidationError::MissingTitleOrQuestions);
        }
        validate_questions(&questions)?;

        Ok(Survey {
            id,
            title,
            description: self.description,
            questions,
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Request body for a partial survey update.
/// Fields that are absent (or null) keep their stored value, everything else in the body is ignored.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SurveyUpdate {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) questions: Option<Vec<Question>>,
    pub(crate) is_active: Option<bool>,
}

impl SurveyUpdate {
    pub(crate) fn validate(&self) -> Result<(), ValidationError> {
        if self.title.as_deref().is_some_and(is_blank) {
            return Err(ValidationError::MissingTitleOrQuestions);
        }

        if let Some(questions) = &self.questions {
            validate_questions(questions)?;
        }

        Ok(())
    }
}
