use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{database::QueryError, id::MalformedIdError, survey::ValidationError};

use super::envelope::Message;

/// Everything a handler can fail with.
/// Server side failures are sent to the caller with their full message text.
#[derive(thiserror::Error, Debug)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),
    #[error("{}", .0.body_text())]
    InvalidPath(#[from] PathRejection),
    #[error("Survey not found")]
    SurveyNotFound,
    #[error(transparent)]
    MalformedId(#[from] MalformedIdError),
    #[error(transparent)]
    Storage(#[from] QueryError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidPath(rejection) => rejection.status(),
            Self::SurveyNotFound => StatusCode::NOT_FOUND,
            Self::MalformedId(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Error handling request: {}", self);
        } else {
            tracing::debug!("Rejected request: {}", self);
        }

        (status, Message::failure(self.to_string())).into_response()
    }
}
