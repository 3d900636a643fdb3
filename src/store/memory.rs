use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CatalogStore, StoreError, ensure_unique_ids};
use crate::models::{ClassSession, ClassType};
use crate::query::{self, CompiledQuery};

#[derive(Default)]
struct Generation {
    sessions: Arc<Vec<ClassSession>>,
    types: Arc<Vec<ClassType>>,
}

/// In-memory catalog.
///
/// New data is fully built before the lock is taken, so readers see either
/// the old or the new generation and never an empty window.
#[derive(Default)]
pub struct MemoryCatalog {
    current: RwLock<Generation>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn replace_sessions(&self, sessions: Vec<ClassSession>) -> Result<(), StoreError> {
        ensure_unique_ids(&sessions)?;
        let sessions = Arc::new(sessions);
        self.current.write().await.sessions = sessions;
        Ok(())
    }

    async fn replace_types(&self, types: Vec<ClassType>) -> Result<(), StoreError> {
        let types = Arc::new(types);
        self.current.write().await.types = types;
        Ok(())
    }

    async fn replace_all(
        &self,
        sessions: Vec<ClassSession>,
        types: Vec<ClassType>,
    ) -> Result<(), StoreError> {
        ensure_unique_ids(&sessions)?;
        let next = Generation {
            sessions: Arc::new(sessions),
            types: Arc::new(types),
        };
        *self.current.write().await = next;
        Ok(())
    }

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<ClassSession>, StoreError> {
        let sessions = self.current.read().await.sessions.clone();
        Ok(query::apply(query, &sessions))
    }

    async fn all_types(&self) -> Result<Vec<ClassType>, StoreError> {
        let types = self.current.read().await.types.clone();
        Ok(types.as_ref().clone())
    }

    async fn is_populated(&self) -> Result<bool, StoreError> {
        Ok(!self.current.read().await.sessions.is_empty())
    }
}
