use std::collections::HashSet;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{ClassSession, ClassType};
use crate::upstream::RawRecord;

#[derive(Debug, Error)]
pub enum MalformedRecordError {
    #[error("record does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
    #[error("invalid timestamp in {field}: '{value}'")]
    Timestamp { field: &'static str, value: String },
    #[error("session {id} does not end after it starts")]
    NonPositiveSpan { id: String },
    #[error("session id {0} appears more than once")]
    DuplicateId(String),
    #[error("record {index}: {source}")]
    InBatch {
        index: usize,
        #[source]
        source: Box<MalformedRecordError>,
    },
}

#[derive(Deserialize)]
struct RawSession {
    #[serde(rename = "ClassInstanceId")]
    id: String,
    #[serde(rename = "ClassName")]
    name: String,
    #[serde(rename = "ClassCode")]
    code: String,
    #[serde(rename = "Club")]
    club: RawClub,
    #[serde(rename = "ClassDescription", default)]
    description: Option<String>,
    #[serde(rename = "Duration")]
    duration: u32,
    #[serde(rename = "StartDateTime")]
    start: String,
    #[serde(rename = "EndDateTime")]
    end: String,
    #[serde(rename = "IsVirtualClass")]
    is_virtual: bool,
}

#[derive(Deserialize)]
struct RawClub {
    #[serde(rename = "ClubCode")]
    code: String,
}

#[derive(Deserialize)]
struct RawClassType {
    #[serde(rename = "Key")]
    id: String,
    #[serde(rename = "Value")]
    name: String,
}

/// Maps upstream records onto catalog entities, deriving local day and hour
/// in the reference timezone.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    tz: Tz,
}

impl Normalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn normalize_session(&self, raw: &RawRecord) -> Result<ClassSession, MalformedRecordError> {
        let record = RawSession::deserialize(raw)?;
        non_empty("ClassInstanceId", &record.id)?;
        non_empty("ClassCode", &record.code)?;
        non_empty("Club.ClubCode", &record.club.code)?;

        let start_at = parse_timestamp("StartDateTime", &record.start)?;
        let end_at = parse_timestamp("EndDateTime", &record.end)?;
        if end_at <= start_at {
            return Err(MalformedRecordError::NonPositiveSpan { id: record.id });
        }

        let local = start_at.with_timezone(&self.tz);
        Ok(ClassSession {
            id: record.id,
            name: record.name,
            code: record.code,
            club: record.club.code,
            description: record.description.unwrap_or_default(),
            duration_minutes: record.duration,
            start_at,
            end_at,
            is_virtual: record.is_virtual,
            local_day: local.date_naive(),
            local_hour: local.hour(),
        })
    }

    pub fn normalize_class_type(&self, raw: &RawRecord) -> Result<ClassType, MalformedRecordError> {
        let record = RawClassType::deserialize(raw)?;
        non_empty("Key", &record.id)?;
        Ok(ClassType {
            id: record.id,
            name: record.name,
        })
    }

    /// Normalizes a whole batch. The first bad record fails the batch.
    pub fn normalize_sessions(
        &self,
        raws: &[RawRecord],
    ) -> Result<Vec<ClassSession>, MalformedRecordError> {
        let mut seen = HashSet::with_capacity(raws.len());
        let mut sessions = Vec::with_capacity(raws.len());
        for (index, raw) in raws.iter().enumerate() {
            let session = self
                .normalize_session(raw)
                .and_then(|session| {
                    if seen.insert(session.id.clone()) {
                        Ok(session)
                    } else {
                        Err(MalformedRecordError::DuplicateId(session.id))
                    }
                })
                .map_err(|err| in_batch(index, err))?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    pub fn normalize_class_types(
        &self,
        raws: &[RawRecord],
    ) -> Result<Vec<ClassType>, MalformedRecordError> {
        raws.iter()
            .enumerate()
            .map(|(index, raw)| {
                self.normalize_class_type(raw)
                    .map_err(|err| in_batch(index, err))
            })
            .collect()
    }
}

fn in_batch(index: usize, err: MalformedRecordError) -> MalformedRecordError {
    MalformedRecordError::InBatch {
        index,
        source: Box::new(err),
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<(), MalformedRecordError> {
    if value.trim().is_empty() {
        Err(MalformedRecordError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, MalformedRecordError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MalformedRecordError::Timestamp {
            field,
            value: value.to_string(),
        })
}
