//! The `{success, data | message}` wrapper every API result is sent in

use std::borrow::Cow;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub(crate) struct Data<T> {
    success: bool,
    data: T,
    /// Number of items in `data`, only included by listings that report it
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

impl<T: Serialize> Data<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            count: None,
        }
    }
}

impl<T: Serialize> Data<Vec<T>> {
    pub(crate) fn counted(data: Vec<T>) -> Self {
        let count = data.len();
        Self {
            success: true,
            data,
            count: Some(count),
        }
    }
}

impl<T: Serialize> IntoResponse for Data<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct Message {
    success: bool,
    message: Cow<'static, str>,
}

impl Message {
    pub(crate) fn success(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn failure(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl IntoResponse for Message {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
