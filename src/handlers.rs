use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    AppState,
    error::ApiError,
    models::{CLUBS, ClassSession, ClassType, Club},
    validation::parse_criteria,
};

#[derive(Debug, Default, serde::Deserialize)]
pub struct ClassesQuery {
    pub name: Option<String>,
    pub club: Option<String>,
    pub date: Option<String>,
    pub hour: Option<String>,
    #[serde(rename = "virtual")]
    pub include_virtual: Option<String>,
}

#[utoipa::path(get, path = "/", tag = "timetable")]
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Fitness Timetable API",
        "endpoints": {
            "/classes": "Upcoming classes, filterable by name, club, date, hour and virtual",
            "/classtypes": "Class codes with their display names",
            "/clubs": "Clubs covered by the timetable",
            "/healthcheck": "Ready once the catalog holds classes"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "health")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/healthcheck",
    responses(
        (status = 200, description = "Catalog is populated"),
        (status = 503, description = "Catalog is empty or unreadable. Earlier releases answered 500 here; treat any non-200 as not ready")
    ),
    tag = "health"
)]
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let healthy = state.catalog.is_healthy().await;
    let refresh = state.refresh.status().await;
    let (status, label) = if healthy {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };
    (
        status,
        Json(serde_json::json!({"status": label, "refresh": refresh})),
    )
}

#[utoipa::path(
    get,
    path = "/classes",
    params(
        ("name" = Option<String>, Query, description = "Comma-separated class codes"),
        ("club" = Option<String>, Query, description = "Comma-separated club codes"),
        ("date" = Option<String>, Query, description = "Comma-separated local dates (YYYY-MM-DD); disables the upcoming-only default"),
        ("hour" = Option<String>, Query, description = "Comma-separated local start hours (0-23)"),
        ("virtual" = Option<bool>, Query, description = "Include virtual classes (default false)")
    ),
    responses(
        (status = 200, description = "Matching classes ordered by start time", body = [ClassSession]),
        (status = 400, description = "Malformed filter parameter"),
        (status = 500, description = "Catalog could not be read")
    ),
    tag = "timetable"
)]
pub async fn list_classes(
    State(state): State<AppState>,
    axum::extract::Query(query): axum::extract::Query<ClassesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let criteria = parse_criteria(&query)?;
    let classes = state.catalog.list_classes(&criteria).await?;
    Ok(Json(classes))
}

#[utoipa::path(
    get,
    path = "/classtypes",
    responses(
        (status = 200, description = "All class types", body = [ClassType]),
        (status = 500, description = "Catalog could not be read")
    ),
    tag = "timetable"
)]
pub async fn list_class_types(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let class_types = state.catalog.list_class_types().await?;
    Ok(Json(class_types))
}

#[utoipa::path(
    get,
    path = "/clubs",
    responses((status = 200, description = "Known clubs", body = [Club])),
    tag = "timetable"
)]
pub async fn list_clubs() -> impl IntoResponse {
    Json(CLUBS)
}
