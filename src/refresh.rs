//! Periodic fetch → normalize → replace cycle.
//!
//! One cycle runs at startup before the API accepts traffic, then one per
//! interval from a background task. Cycles never overlap. A failed cycle is
//! logged and leaves the current catalog generation in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use utoipa::ToSchema;

use crate::normalize::{MalformedRecordError, Normalizer};
use crate::store::{CatalogStore, StoreError};
use crate::upstream::{TimetableSource, UpstreamError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("fetch failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("normalization failed: {0}")]
    Malformed(#[from] MalformedRecordError),
    #[error("upstream returned no classes")]
    EmptyTimetable,
    #[error("replace failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    #[default]
    Idle,
    Fetching,
    Normalizing,
    Replacing,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RefreshStatus {
    pub state: RefreshState,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_success_at: Option<DateTime<Utc>>,
    pub sessions: usize,
    pub class_types: usize,
    pub failed_cycles: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub sessions: usize,
    pub class_types: usize,
}

pub struct RefreshScheduler {
    source: Arc<dyn TimetableSource>,
    store: Arc<dyn CatalogStore>,
    normalizer: Normalizer,
    interval: Duration,
    status: RwLock<RefreshStatus>,
    cycle: Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn TimetableSource>,
        store: Arc<dyn CatalogStore>,
        normalizer: Normalizer,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            normalizer,
            interval,
            status: RwLock::new(RefreshStatus::default()),
            cycle: Mutex::new(()),
        }
    }

    pub async fn status(&self) -> RefreshStatus {
        self.status.read().await.clone()
    }

    /// Runs one cycle. Concurrent callers are serialized.
    pub async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        let _running = self.cycle.lock().await;
        let started = Instant::now();

        match self.execute_cycle().await {
            Ok(report) => {
                let mut status = self.status.write().await;
                status.state = RefreshState::Idle;
                status.last_success_at = Some(Utc::now());
                status.sessions = report.sessions;
                status.class_types = report.class_types;
                status.last_error = None;
                info!(
                    sessions = report.sessions,
                    class_types = report.class_types,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "catalog refreshed"
                );
                Ok(report)
            }
            Err(err) => {
                self.set_state(RefreshState::Failed).await;
                error!(error = %err, "catalog refresh failed; keeping previous generation");
                let mut status = self.status.write().await;
                status.failed_cycles += 1;
                status.last_error = Some(err.to_string());
                status.state = RefreshState::Idle;
                Err(err)
            }
        }
    }

    async fn execute_cycle(&self) -> Result<CycleReport, RefreshError> {
        self.set_state(RefreshState::Fetching).await;
        let raw = self.source.fetch().await?;

        self.set_state(RefreshState::Normalizing).await;
        let sessions = self.normalizer.normalize_sessions(&raw.sessions)?;
        if sessions.is_empty() {
            return Err(RefreshError::EmptyTimetable);
        }
        let class_types = self.normalizer.normalize_class_types(&raw.class_types)?;
        let report = CycleReport {
            sessions: sessions.len(),
            class_types: class_types.len(),
        };

        self.set_state(RefreshState::Replacing).await;
        self.store.replace_all(sessions, class_types).await?;
        Ok(report)
    }

    async fn set_state(&self, state: RefreshState) {
        debug!(?state, "refresh state");
        self.status.write().await.state = state;
    }

    /// Spawns the periodic loop. The first tick fires one interval from now;
    /// the startup cycle is the caller's job. Cancellation is honored between
    /// cycles.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "refresh scheduler started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("refresh scheduler stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        info!("refreshing catalog");
                        // Failures are logged and recorded in the status.
                        let _ = self.run_cycle().await;
                    }
                }
            }
        })
    }
}
