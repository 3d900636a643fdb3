use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::handlers::ClassesQuery;
use crate::query::{InvalidQueryError, QueryCriteria};

/// Turns the raw `/classes` query string into criteria. Every list parameter
/// is comma-separated; blank entries are ignored.
pub fn parse_criteria(query: &ClassesQuery) -> Result<QueryCriteria, InvalidQueryError> {
    let names = split_list(query.name.as_deref())
        .map(str::to_string)
        .collect();
    let clubs = split_list(query.club.as_deref())
        .map(str::to_string)
        .collect();

    let dates = split_list(query.date.as_deref())
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| InvalidQueryError::Date(raw.to_string()))
        })
        .collect::<Result<BTreeSet<_>, _>>()?;

    let hours = split_list(query.hour.as_deref())
        .map(parse_hour)
        .collect::<Result<BTreeSet<_>, _>>()?;

    let include_virtual = match query.include_virtual.as_deref().map(str::trim) {
        None | Some("") => false,
        Some(raw) => parse_bool(raw).ok_or_else(|| InvalidQueryError::Virtual(raw.to_string()))?,
    };

    Ok(QueryCriteria {
        names,
        clubs,
        dates,
        hours,
        include_virtual,
    })
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

fn parse_hour(raw: &str) -> Result<u32, InvalidQueryError> {
    raw.parse::<u32>()
        .ok()
        .filter(|hour| *hour <= 23)
        .ok_or_else(|| InvalidQueryError::Hour(raw.to_string()))
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(name: Option<&str>, club: Option<&str>, date: Option<&str>, hour: Option<&str>) -> ClassesQuery {
        ClassesQuery {
            name: name.map(str::to_string),
            club: club.map(str::to_string),
            date: date.map(str::to_string),
            hour: hour.map(str::to_string),
            include_virtual: None,
        }
    }

    #[test]
    fn test_parse_empty_query() {
        let criteria = parse_criteria(&ClassesQuery::default()).unwrap();
        assert_eq!(criteria, QueryCriteria::default());
    }

    #[test]
    fn test_parse_lists() {
        let criteria = parse_criteria(&query(
            Some("BP,RPM"),
            Some("01, 09,"),
            Some("2025-06-01,2025-06-02"),
            Some("6,11"),
        ))
        .unwrap();
        assert_eq!(criteria.names.len(), 2);
        assert!(criteria.clubs.contains("09"));
        assert_eq!(criteria.dates.len(), 2);
        assert_eq!(criteria.hours, BTreeSet::from([6, 11]));
    }

    #[test]
    fn test_malformed_date_rejected() {
        let err = parse_criteria(&query(None, None, Some("2025-06-01,01/06/2025"), None)).unwrap_err();
        assert_eq!(err, InvalidQueryError::Date("01/06/2025".into()));
    }

    #[test]
    fn test_malformed_hour_rejected() {
        assert!(parse_criteria(&query(None, None, None, Some("eleven"))).is_err());
        assert!(parse_criteria(&query(None, None, None, Some("-1"))).is_err());
        assert!(parse_criteria(&query(None, None, None, Some("24"))).is_err());
    }

    #[test]
    fn test_virtual_flag() {
        let mut q = ClassesQuery {
            include_virtual: Some("True".into()),
            ..Default::default()
        };
        assert!(parse_criteria(&q).unwrap().include_virtual);
        q.include_virtual = Some("0".into());
        assert!(!parse_criteria(&q).unwrap().include_virtual);
        q.include_virtual = Some("yes".into());
        assert_eq!(
            parse_criteria(&q).unwrap_err(),
            InvalidQueryError::Virtual("yes".into())
        );
    }
}
