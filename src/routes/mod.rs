use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

use self::{
    envelope::{Data, Message},
    error::ApiError,
};

pub(crate) mod envelope;
pub(crate) mod error;
mod response;
mod survey;

pub(crate) fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health).fallback(route_not_found))
        .route(
            "/api/dashboard/stats",
            get(dashboard_stats).fallback(route_not_found),
        )
        .merge(survey::create_router())
        .merge(response::create_router())
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub(crate) async fn route_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Message::failure("Route not found"))
}

#[derive(Serialize, Debug)]
struct Health {
    status: &'static str,
    message: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "OK",
        message: "Survey API Running",
    })
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct DashboardStats {
    total_surveys: u64,
    active_surveys: u64,
    total_responses: u64,
}

async fn dashboard_stats(State(state): State<AppState>) -> Result<Data<DashboardStats>, ApiError> {
    let totals = state.database.get_totals().await?;

    Ok(Data::new(DashboardStats {
        total_surveys: totals.surveys,
        active_surveys: totals.active_surveys,
        total_responses: totals.responses,
    }))
}
