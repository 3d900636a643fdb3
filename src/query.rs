//! Compiles request criteria into a predicate tree over class sessions.
//!
//! Each non-empty dimension (name, club, date, hour) becomes an OR-group and
//! the groups are combined with AND. Dates are day windows in the reference
//! timezone; without explicit dates only sessions starting after `now` are
//! visible. Virtual classes are excluded unless asked for.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Days, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::models::{ClassSession, Club};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidQueryError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    Date(String),
    #[error("Invalid hour '{0}', expected an integer between 0 and 23")]
    Hour(String),
    #[error("Invalid virtual flag '{0}', expected a boolean")]
    Virtual(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCriteria {
    pub names: BTreeSet<String>,
    pub clubs: BTreeSet<String>,
    pub dates: BTreeSet<NaiveDate>,
    pub hours: BTreeSet<u32>,
    pub include_virtual: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Logical AND. Matches everything when empty.
    All(Vec<Predicate>),
    /// Logical OR. Matches nothing when empty.
    Any(Vec<Predicate>),
    Code(String),
    Club(String),
    /// Half-open `[from, until)` window over `start_at`.
    StartsWithin {
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    StartsAfter(DateTime<Utc>),
    LocalHour(u32),
    Virtual(bool),
}

impl Predicate {
    pub fn matches(&self, session: &ClassSession) -> bool {
        match self {
            Predicate::All(parts) => parts.iter().all(|p| p.matches(session)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(session)),
            Predicate::Code(code) => session.code == *code,
            Predicate::Club(club) => session.club == *club,
            Predicate::StartsWithin { from, until } => {
                session.start_at >= *from && session.start_at < *until
            }
            Predicate::StartsAfter(instant) => session.start_at > *instant,
            Predicate::LocalHour(hour) => session.local_hour == *hour,
            Predicate::Virtual(flag) => session.is_virtual == *flag,
        }
    }
}

/// Result ordering. Sessions starting at the same instant are ordered by id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    #[default]
    StartAt,
}

impl OrderBy {
    pub fn compare(&self, a: &ClassSession, b: &ClassSession) -> Ordering {
        match self {
            OrderBy::StartAt => a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub predicate: Predicate,
    pub order: OrderBy,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryEngine {
    tz: Tz,
}

impl QueryEngine {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn compile(
        &self,
        criteria: &QueryCriteria,
        now: DateTime<Utc>,
    ) -> Result<CompiledQuery, InvalidQueryError> {
        let mut groups = Vec::new();

        if !criteria.names.is_empty() {
            groups.push(Predicate::Any(
                criteria.names.iter().cloned().map(Predicate::Code).collect(),
            ));
        }

        if !criteria.clubs.is_empty() {
            // Unknown codes add nothing, so they narrow rather than fail.
            groups.push(Predicate::Any(
                criteria
                    .clubs
                    .iter()
                    .filter_map(|code| Club::lookup(code))
                    .map(|club| Predicate::Club(club.code.to_string()))
                    .collect(),
            ));
        }

        if criteria.dates.is_empty() {
            groups.push(Predicate::StartsAfter(now));
        } else {
            let windows = criteria
                .dates
                .iter()
                .map(|date| self.day_window(*date))
                .collect::<Result<Vec<_>, _>>()?;
            groups.push(Predicate::Any(windows));
        }

        if !criteria.hours.is_empty() {
            let mut hours = Vec::with_capacity(criteria.hours.len());
            for hour in &criteria.hours {
                if *hour > 23 {
                    return Err(InvalidQueryError::Hour(hour.to_string()));
                }
                hours.push(Predicate::LocalHour(*hour));
            }
            groups.push(Predicate::Any(hours));
        }

        if !criteria.include_virtual {
            groups.push(Predicate::Virtual(false));
        }

        Ok(CompiledQuery {
            predicate: Predicate::All(groups),
            order: OrderBy::StartAt,
        })
    }

    fn day_window(&self, date: NaiveDate) -> Result<Predicate, InvalidQueryError> {
        let next = date
            .checked_add_days(Days::new(1))
            .ok_or_else(|| InvalidQueryError::Date(date.to_string()))?;
        Ok(Predicate::StartsWithin {
            from: self.local_midnight(date)?,
            until: self.local_midnight(next)?,
        })
    }

    /// First instant of the local day. When midnight falls in a DST gap this
    /// is the first wall-clock minute after the gap; a day skipped entirely
    /// starts where the next one does.
    fn local_midnight(&self, date: NaiveDate) -> Result<DateTime<Utc>, InvalidQueryError> {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| InvalidQueryError::Date(date.to_string()))?;
        (0..=MAX_GAP_MINUTES)
            .filter_map(|minutes| midnight.checked_add_signed(Duration::minutes(minutes)))
            .find_map(|local| self.tz.from_local_datetime(&local).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| InvalidQueryError::Date(date.to_string()))
    }
}

// Longest local-time discontinuity on record is a skipped calendar day.
const MAX_GAP_MINUTES: i64 = 48 * 60;

/// Evaluates a compiled query over an in-memory slice.
pub fn apply(query: &CompiledQuery, sessions: &[ClassSession]) -> Vec<ClassSession> {
    let mut matched: Vec<ClassSession> = sessions
        .iter()
        .filter(|session| query.predicate.matches(session))
        .cloned()
        .collect();
    matched.sort_by(|a, b| query.order.compare(a, b));
    matched
}
