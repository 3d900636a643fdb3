//! Catalog storage.
//!
//! Two implementations of [`CatalogStore`]:
//! - `memory`: immutable generations swapped behind a lock
//! - `sqlite`: durable tables replaced inside a single transaction
//!
//! Every replace either installs the whole new generation or leaves the
//! previous one untouched.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ClassSession, ClassType};
use crate::query::CompiledQuery;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session id {0} appears more than once in the generation")]
    DuplicateSession(String),
    #[error("Stored row is invalid: {0}")]
    CorruptRow(String),
    #[error("Database schema version {found} is newer than supported {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },
    #[error("Storage worker failed: {0}")]
    Worker(String),
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn replace_sessions(&self, sessions: Vec<ClassSession>) -> Result<(), StoreError>;

    async fn replace_types(&self, types: Vec<ClassType>) -> Result<(), StoreError>;

    /// Installs sessions and class types from the same refresh cycle as one
    /// generation.
    async fn replace_all(
        &self,
        sessions: Vec<ClassSession>,
        types: Vec<ClassType>,
    ) -> Result<(), StoreError>;

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<ClassSession>, StoreError>;

    async fn all_types(&self) -> Result<Vec<ClassType>, StoreError>;

    async fn is_populated(&self) -> Result<bool, StoreError>;
}

pub(crate) fn ensure_unique_ids(sessions: &[ClassSession]) -> Result<(), StoreError> {
    let mut seen = HashSet::with_capacity(sessions.len());
    for session in sessions {
        if !seen.insert(session.id.as_str()) {
            return Err(StoreError::DuplicateSession(session.id.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store implementation must share.

    use chrono::{DateTime, Utc};

    use super::*;
    use crate::query::tests::session;
    use crate::query::{QueryCriteria, QueryEngine};

    fn now() -> DateTime<Utc> {
        "2025-06-10T00:00:00Z".parse().unwrap()
    }

    fn everything() -> CompiledQuery {
        let criteria = QueryCriteria {
            dates: [chrono::NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()].into(),
            include_virtual: true,
            ..Default::default()
        };
        QueryEngine::new(chrono_tz::Pacific::Auckland)
            .compile(&criteria, now())
            .unwrap()
    }

    fn first_generation() -> Vec<ClassSession> {
        vec![
            session("b", "BP", "01", "2025-06-10T22:00:00Z", false),
            session("a", "RPM", "09", "2025-06-10T21:00:00Z", true),
        ]
    }

    fn types() -> Vec<ClassType> {
        vec![ClassType {
            id: "BP".into(),
            name: "BODYPUMP".into(),
        }]
    }

    pub(crate) async fn starts_empty(store: &dyn CatalogStore) {
        assert!(!store.is_populated().await.unwrap());
        assert!(store.query(&everything()).await.unwrap().is_empty());
        assert!(store.all_types().await.unwrap().is_empty());
    }

    pub(crate) async fn replace_is_ordered_and_idempotent(store: &dyn CatalogStore) {
        store.replace_sessions(first_generation()).await.unwrap();
        let once = store.query(&everything()).await.unwrap();
        store.replace_sessions(first_generation()).await.unwrap();
        let twice = store.query(&everything()).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(
            once.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(once[1], first_generation()[0]);
        assert!(store.is_populated().await.unwrap());
    }

    pub(crate) async fn failed_replace_keeps_previous_generation(store: &dyn CatalogStore) {
        store.replace_all(first_generation(), types()).await.unwrap();

        let broken = vec![
            session("c", "GRIT", "13", "2025-06-10T23:00:00Z", false),
            session("c", "GRIT", "13", "2025-06-11T01:00:00Z", false),
        ];
        assert!(store.replace_sessions(broken.clone()).await.is_err());
        assert!(store.replace_all(broken, Vec::new()).await.is_err());

        let sessions = store.query(&everything()).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.id != "c"));
        assert_eq!(store.all_types().await.unwrap(), types());
    }

    pub(crate) async fn predicate_filters_rows(store: &dyn CatalogStore) {
        store.replace_sessions(first_generation()).await.unwrap();
        let criteria = QueryCriteria {
            clubs: ["01".to_string()].into(),
            ..Default::default()
        };
        let query = QueryEngine::new(chrono_tz::Pacific::Auckland)
            .compile(&criteria, now())
            .unwrap();
        let sessions = store.query(&query).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "b");
    }

    pub(crate) async fn replace_types_swaps_table(store: &dyn CatalogStore) {
        store.replace_types(types()).await.unwrap();
        let replacement = vec![ClassType {
            id: "RPM".into(),
            name: "RPM".into(),
        }];
        store.replace_types(replacement.clone()).await.unwrap();
        assert_eq!(store.all_types().await.unwrap(), replacement);
    }
}
