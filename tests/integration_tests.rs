use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Pacific::Auckland;
use fitness_timetable::catalog::Catalog;
use fitness_timetable::normalize::Normalizer;
use fitness_timetable::refresh::RefreshScheduler;
use fitness_timetable::settings::Settings;
use fitness_timetable::store::MemoryCatalog;
use fitness_timetable::upstream::UpstreamClient;
use fitness_timetable::{AppState, build_router};
use httpmock::prelude::*;
use serde_json::{Value, json};
use tower::Service;
use url::Url;

const UPSTREAM_PATH: &str = "/api/timetable/get-timetable-epi";

/// Helper function to create test app state backed by an in-memory catalog
fn create_test_state(upstream_base: &str) -> AppState {
    let settings = Settings {
        upstream_url: Url::parse(upstream_base).unwrap().join(UPSTREAM_PATH).unwrap(),
        club_codes: "01,09,13,06".to_string(),
        reference_timezone: "Pacific/Auckland".to_string(),
        refresh_interval_secs: 21600,
        upstream_timeout_secs: 5,
        database_path: None,
        debug: true,
        enable_swagger: true,
        port: 8080,
    };

    let store = Arc::new(MemoryCatalog::new());
    let client = UpstreamClient::new(
        settings.upstream_url.clone(),
        settings.club_codes(),
        settings.upstream_timeout(),
    )
    .unwrap();
    let refresh = Arc::new(RefreshScheduler::new(
        Arc::new(client),
        store.clone(),
        Normalizer::new(Auckland),
        settings.refresh_interval(),
    ));

    AppState {
        settings,
        catalog: Catalog::new(store, Auckland),
        refresh,
    }
}

/// Start time `days_ahead` days from today at `hour` o'clock Auckland time
fn local_start(days_ahead: i64, hour: u32) -> chrono::DateTime<Utc> {
    let day = Utc::now().with_timezone(&Auckland).date_naive() + Duration::days(days_ahead);
    Auckland
        .from_local_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

fn raw_class(id: &str, code: &str, club: &str, start: chrono::DateTime<Utc>, is_virtual: bool) -> Value {
    json!({
        "ClassInstanceId": id,
        "ClassName": format!("{code} class"),
        "ClassCode": code,
        "Club": {"ClubCode": club, "Name": "Club"},
        "ClassDescription": "Test class",
        "Duration": 45,
        "StartDateTime": start.to_rfc3339(),
        "EndDateTime": (start + Duration::minutes(45)).to_rfc3339(),
        "IsVirtualClass": is_virtual
    })
}

fn payload() -> Value {
    json!({
        "Classes": [
            raw_class("club01-11", "BP", "01", local_start(2, 11), false),
            raw_class("club13-11", "RPM", "13", local_start(2, 11), false),
            raw_class("club01-09", "BP", "01", local_start(2, 9), false),
            raw_class("virtual", "BP", "01", local_start(3, 11), true),
            raw_class("yesterday", "BP", "09", local_start(-1, 11), false),
        ],
        "ClassType": [
            {"Key": "BP", "Value": "BODYPUMP"},
            {"Key": "RPM", "Value": "RPM"}
        ]
    })
}

/// Mocks the upstream provider and runs one refresh cycle against it
async fn populated_app() -> (MockServer, axum::Router) {
    let mock_server = MockServer::start_async().await;
    mock_server
        .mock_async(|when, then| {
            when.method(POST).path(UPSTREAM_PATH);
            then.status(200)
                .header("content-type", "application/json")
                .body(payload().to_string());
        })
        .await;

    let state = create_test_state(&mock_server.base_url());
    state.refresh.run_cycle().await.unwrap();
    (mock_server, build_router(state))
}

/// Helper to extract response body as string
async fn response_body_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn get(app: &mut axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .call(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, response_body_string(response.into_body()).await)
}

fn ids(body: &str) -> Vec<String> {
    let classes: Vec<Value> = serde_json::from_str(body).unwrap();
    classes
        .iter()
        .map(|c| c["ID"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_root_endpoint() {
    // Arrange
    let mut app = build_router(create_test_state("http://127.0.0.1:9"));

    // Act
    let (status, body) = get(&mut app, "/").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Fitness Timetable API"));
    assert!(body.contains("/classes"));
}

#[tokio::test]
async fn test_healthz_live() {
    let mut app = build_router(create_test_state("http://127.0.0.1:9"));

    let (status, body) = get(&mut app, "/healthz/live").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"ok"#));
}

#[tokio::test]
async fn test_healthcheck_unavailable_before_refresh() {
    let mut app = build_router(create_test_state("http://127.0.0.1:9"));

    let (status, body) = get(&mut app, "/healthcheck/").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("unavailable"));
}

#[tokio::test]
async fn test_healthcheck_ok_after_refresh() {
    let (_server, mut app) = populated_app().await;

    let (status, body) = get(&mut app, "/healthz/ready").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["refresh"]["sessions"], 5);
    assert_eq!(json["refresh"]["state"], "idle");
}

#[tokio::test]
async fn test_classes_default_hides_past_and_virtual() {
    let (_server, mut app) = populated_app().await;

    let (status, body) = get(&mut app, "/classes").await;

    assert_eq!(status, StatusCode::OK);
    let ids = ids(&body);
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], "club01-09");
    assert!(!ids.contains(&"virtual".to_string()));
    assert!(!ids.contains(&"yesterday".to_string()));
    assert!(body.contains(r#""IsVirtualClass":false"#));
}

#[tokio::test]
async fn test_classes_clubs_and_hour() {
    let (_server, mut app) = populated_app().await;

    let (status, body) = get(&mut app, "/classes/?club=01,09&hour=11").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["club01-11"]);
}

#[tokio::test]
async fn test_classes_virtual_included_on_request() {
    let (_server, mut app) = populated_app().await;

    let (_, body) = get(&mut app, "/classes?name=BP&virtual=true").await;

    assert_eq!(ids(&body), vec!["club01-09", "club01-11", "virtual"]);
}

#[tokio::test]
async fn test_classes_past_date_is_visible() {
    let (_server, mut app) = populated_app().await;
    let yesterday = local_start(-1, 11).with_timezone(&Auckland).date_naive();

    let (status, body) = get(&mut app, &format!("/classes?date={yesterday}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&body), vec!["yesterday"]);
}

#[tokio::test]
async fn test_classes_unknown_club_is_empty() {
    let (_server, mut app) = populated_app().await;

    let (status, body) = get(&mut app, "/classes?club=99").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_classes_malformed_date() {
    let (_server, mut app) = populated_app().await;

    let (status, body) = get(&mut app, "/classes?date=tomorrow").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("tomorrow"));
}

#[tokio::test]
async fn test_classes_malformed_hour_and_virtual() {
    let (_server, mut app) = populated_app().await;

    let (hour_status, _) = get(&mut app, "/classes?hour=noon").await;
    let (virtual_status, _) = get(&mut app, "/classes?virtual=maybe").await;

    assert_eq!(hour_status, StatusCode::BAD_REQUEST);
    assert_eq!(virtual_status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_classtypes() {
    let (_server, mut app) = populated_app().await;

    let (status, body) = get(&mut app, "/classtypes/").await;

    assert_eq!(status, StatusCode::OK);
    let types: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(types.len(), 2);
    assert_eq!(types[0], json!({"ID": "BP", "Name": "BODYPUMP"}));
}

#[tokio::test]
async fn test_clubs() {
    let mut app = build_router(create_test_state("http://127.0.0.1:9"));

    let (status, body) = get(&mut app, "/clubs").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""ClubCode":"13""#));
    assert!(body.contains("Newmarket"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_serving_previous_catalog() {
    // Arrange
    let mock_server = MockServer::start_async().await;
    let mut ok_mock = mock_server
        .mock_async(|when, then| {
            when.method(POST).path(UPSTREAM_PATH);
            then.status(200).body(payload().to_string());
        })
        .await;
    let state = create_test_state(&mock_server.base_url());
    state.refresh.run_cycle().await.unwrap();

    ok_mock.delete_async().await;
    mock_server
        .mock_async(|when, then| {
            when.method(POST).path(UPSTREAM_PATH);
            then.status(503);
        })
        .await;

    // Act
    assert!(state.refresh.run_cycle().await.is_err());
    let mut app = build_router(state);
    let (health, body) = get(&mut app, "/healthcheck").await;
    let (_, classes) = get(&mut app, "/classes").await;

    // Assert
    assert_eq!(health, StatusCode::OK);
    assert!(body.contains("503"));
    assert_eq!(ids(&classes).len(), 3);
}
