use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use url::Url;

/// A single upstream record, decoded into a typed entity by the normalizer.
pub type RawRecord = serde_json::Value;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream responded with status {0}")]
    Status(reqwest::StatusCode),
    #[error("Malformed upstream payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),
}

/// The two top-level collections of an upstream timetable response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTimetable {
    #[serde(rename = "Classes")]
    pub sessions: Vec<RawRecord>,
    #[serde(rename = "ClassType")]
    pub class_types: Vec<RawRecord>,
}

#[async_trait]
pub trait TimetableSource: Send + Sync {
    async fn fetch(&self) -> Result<RawTimetable, UpstreamError>;
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    url: Url,
    club_codes: Vec<String>,
}

impl UpstreamClient {
    pub fn new(url: Url, club_codes: Vec<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            club_codes,
        })
    }

    fn form_body(&self) -> String {
        format!("Club={}", self.club_codes.join(","))
    }

    pub fn parse_payload(body: &[u8]) -> Result<RawTimetable, UpstreamError> {
        serde_json::from_slice(body).map_err(UpstreamError::MalformedPayload)
    }
}

#[async_trait]
impl TimetableSource for UpstreamClient {
    #[tracing::instrument(level = "info", skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<RawTimetable, UpstreamError> {
        let response = self
            .client
            .post(self.url.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(self.form_body())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }

        let body = response.bytes().await?;
        let timetable = Self::parse_payload(&body)?;
        info!(
            sessions = timetable.sessions.len(),
            class_types = timetable.class_types.len(),
            "fetched upstream timetable"
        );
        Ok(timetable)
    }
}
