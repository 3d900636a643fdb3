use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
pub struct Club {
    #[serde(rename = "ClubCode")]
    #[schema(value_type = String)]
    pub code: &'static str,
    #[serde(rename = "Name")]
    #[schema(value_type = String)]
    pub name: &'static str,
}

/// Clubs known at deploy time.
pub const CLUBS: &[Club] = &[
    Club {
        code: "01",
        name: "Auckland City",
    },
    Club {
        code: "09",
        name: "Britomart",
    },
    Club {
        code: "13",
        name: "Newmarket",
    },
    Club {
        code: "06",
        name: "Takapuna",
    },
];

impl Club {
    pub fn lookup(code: &str) -> Option<&'static Club> {
        CLUBS.iter().find(|club| club.code == code)
    }
}

/// One scheduled occurrence of a class.
///
/// `local_day` and `local_hour` are derived from `start_at` in the catalog's
/// reference timezone when the session is normalized.
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct ClassSession {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Club")]
    pub club: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Duration")]
    pub duration_minutes: u32,
    #[serde(rename = "StartDatetime")]
    #[schema(value_type = String, format = "date-time", example = "2025-11-24T06:15:00Z")]
    pub start_at: DateTime<Utc>,
    #[serde(rename = "EndDatetime")]
    #[schema(value_type = String, format = "date-time", example = "2025-11-24T07:00:00Z")]
    pub end_at: DateTime<Utc>,
    #[serde(rename = "IsVirtualClass")]
    pub is_virtual: bool,
    #[serde(skip)]
    pub local_day: NaiveDate,
    #[serde(skip)]
    pub local_hour: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
pub struct ClassType {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}
