//! Shared analytics handle
//!
//! `AnalyticsService` owns the aggregate for the lifetime of the process.
//! Recording takes the write lock for exactly one fold; reports take the read
//! lock. Checkpoints are cloned under the lock and written after it is
//! released, so disk latency never holds up other requests.

use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::events::AnalyticsEvent;
use super::models::AggregateState;
use super::persistence::SnapshotStore;
use super::recorder::{apply_event, checkpoint_due};
use super::reporter::{
    self, BusinessInsights, Dashboard, MemoryUsage, SystemHealth, Timeframe, UserActivity,
};
use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;

#[derive(Clone)]
pub struct AnalyticsService {
    state: Arc<RwLock<AggregateState>>,
    store: Arc<dyn SnapshotStore>,
    checkpoint_interval: u64,
    persist_timeout: Duration,
    /// Event total of the newest snapshot written so far.
    last_written: Arc<Mutex<u64>>,
}

impl AnalyticsService {
    /// Initialize the aggregate from `store`.
    ///
    /// Never fails: a missing snapshot is created, an unreadable one is logged
    /// and replaced by an empty aggregate in memory.
    pub async fn load(store: Arc<dyn SnapshotStore>, config: &AnalyticsConfig) -> Self {
        let started = Utc::now();

        let (state, needs_initial_save) = match store.load().await {
            Ok(Some(mut snapshot)) => {
                snapshot.system_info.start_time = started;
                snapshot.system_info.uptime = 0;
                info!(
                    "Loaded analytics snapshot with {} recorded events",
                    snapshot.total_requests
                );
                (snapshot, false)
            }
            Ok(None) => {
                info!("No analytics snapshot found, starting fresh");
                (AggregateState::new(started), true)
            }
            Err(e) => {
                error!("Failed to load analytics snapshot, starting empty: {}", e);
                (AggregateState::new(started), false)
            }
        };

        let service = Self {
            last_written: Arc::new(Mutex::new(state.total_requests)),
            state: Arc::new(RwLock::new(state)),
            store,
            checkpoint_interval: config.checkpoint_interval,
            persist_timeout: config.persist_timeout,
        };

        if needs_initial_save {
            service.flush().await;
        }

        service
    }

    /// Record an event observed now.
    pub async fn record_event(&self, event: AnalyticsEvent) {
        self.record_event_at(event, Local::now()).await;
    }

    /// Record an event observed at `now`.
    pub async fn record_event_at(&self, event: AnalyticsEvent, now: DateTime<Local>) {
        let checkpoint = {
            let mut state = self.state.write().await;
            apply_event(&mut state, &event, now);
            checkpoint_due(&state, self.checkpoint_interval).then(|| state.clone())
        };

        if let Some(snapshot) = checkpoint {
            debug!(
                "Checkpointing analytics after {} events",
                snapshot.total_requests
            );
            self.persist(snapshot).await;
        }
    }

    /// Write the current aggregate regardless of the checkpoint cadence.
    pub async fn flush(&self) {
        let snapshot = self.state.read().await.clone();
        self.persist(snapshot).await;
    }

    async fn persist(&self, snapshot: AggregateState) {
        let mut last_written = self.last_written.lock().await;
        if snapshot.total_requests < *last_written {
            debug!(
                "Skipping stale snapshot ({} < {} events)",
                snapshot.total_requests, *last_written
            );
            return;
        }

        match tokio::time::timeout(self.persist_timeout, self.store.save(&snapshot)).await {
            Ok(Ok(())) => *last_written = snapshot.total_requests,
            Ok(Err(e)) => error!("Failed to save analytics snapshot: {}", e),
            Err(_) => warn!(
                "Analytics snapshot not saved: {}",
                AnalyticsError::Timeout(self.persist_timeout)
            ),
        }
    }

    /// Copy of the whole aggregate.
    pub async fn raw_state(&self) -> AggregateState {
        self.state.read().await.clone()
    }

    pub async fn dashboard(&self) -> Dashboard {
        reporter::dashboard(&*self.state.read().await, Local::now())
    }

    pub async fn user_activity(&self, timeframe: Timeframe) -> UserActivity {
        reporter::user_activity(&*self.state.read().await, timeframe, Local::now())
    }

    pub async fn business_insights(&self) -> BusinessInsights {
        reporter::business_insights(&*self.state.read().await)
    }

    pub async fn system_health(&self) -> SystemHealth {
        let memory = MemoryUsage::current();
        reporter::system_health(&*self.state.read().await, memory, Local::now())
    }
}
