use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ClassSession, ClassType};
use crate::query::{InvalidQueryError, QueryCriteria, QueryEngine};
use crate::store::{CatalogStore, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    InvalidQuery(#[from] InvalidQueryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read side of the catalog, shared by every request handler.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
    engine: QueryEngine,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>, tz: Tz) -> Self {
        Self {
            store,
            engine: QueryEngine::new(tz),
        }
    }

    pub async fn list_classes(
        &self,
        criteria: &QueryCriteria,
    ) -> Result<Vec<ClassSession>, CatalogError> {
        self.list_classes_at(criteria, Utc::now()).await
    }

    pub async fn list_classes_at(
        &self,
        criteria: &QueryCriteria,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClassSession>, CatalogError> {
        let query = self.engine.compile(criteria, now)?;
        let classes = self.store.query(&query).await?;
        debug!(count = classes.len(), "returning classes");
        Ok(classes)
    }

    pub async fn list_class_types(&self) -> Result<Vec<ClassType>, StoreError> {
        self.store.all_types().await
    }

    pub async fn is_healthy(&self) -> bool {
        match self.store.is_populated().await {
            Ok(populated) => populated,
            Err(err) => {
                warn!(error = %err, "catalog health probe failed");
                false
            }
        }
    }
}
