//! Quality sync task.
//!
//! Full sync at startup, then a ticked check (default hourly) that performs
//! one incremental sync per calendar day once past the configured hour.
//! Transient source failures are logged and retried on the next tick.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::RwLock;
use utoipa::ToSchema;

use super::cache::QualityCache;
use super::source::QualitySource;
use crate::utils::ScheduledTask;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncResult {
    /// "full", "incremental" or "skipped"
    pub kind: String,
    pub synced: usize,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub struct QualitySyncTask {
    cache: Arc<QualityCache>,
    source: Arc<dyn QualitySource>,
    sync_hour: u32,
    last_daily_sync: RwLock<Option<NaiveDate>>,
}

impl QualitySyncTask {
    pub fn new(cache: Arc<QualityCache>, source: Arc<dyn QualitySource>, sync_hour: u32) -> Self {
        Self {
            cache,
            source,
            sync_hour,
            last_daily_sync: RwLock::new(None),
        }
    }

    /// Full sync, bypassing the daily guard. Used at startup and by
    /// `POST /api/monitoring/quality/sync`.
    pub async fn force_sync(&self) -> Result<SyncResult, anyhow::Error> {
        let metrics = self.source.get_all().await?;
        let synced = self.cache.set_batch(metrics);
        let now = Utc::now();
        self.cache.mark_synced(now);
        self.remember_daily_sync(now.date_naive());

        Ok(SyncResult { kind: "full".into(), synced, reason: None, timestamp: now })
    }

    /// Incremental sync against the last successful sync point.
    async fn incremental_sync(&self) -> Result<SyncResult, anyhow::Error> {
        let now = Utc::now();

        let Some(last_sync) = self.cache.last_sync() else {
            return self.force_sync().await;
        };

        let updated = self.source.get_updated_since(last_sync).await?;
        if updated.is_empty() {
            self.remember_daily_sync(now.date_naive());
            return Ok(SyncResult {
                kind: "skipped".into(),
                synced: 0,
                reason: Some("no_updates".into()),
                timestamp: now,
            });
        }

        let synced = self.cache.set_batch(updated);
        self.cache.mark_synced(now);
        self.remember_daily_sync(now.date_naive());

        Ok(SyncResult { kind: "incremental".into(), synced, reason: None, timestamp: now })
    }

    fn remember_daily_sync(&self, date: NaiveDate) {
        *self
            .last_daily_sync
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(date);
    }

    fn should_run_daily_sync(&self, now: DateTime<Utc>) -> bool {
        let last = *self
            .last_daily_sync
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match last {
            None => true,
            Some(date) if date == now.date_naive() => false,
            Some(_) => now.time().hour() >= self.sync_hour,
        }
    }

    async fn tick(&self) -> Result<(), anyhow::Error> {
        if !self.should_run_daily_sync(Utc::now()) {
            return Ok(());
        }

        tracing::info!("Running daily quality sync");
        let result = self.incremental_sync().await?;
        tracing::info!(
            "Daily quality sync complete: {} ({} tables{})",
            result.kind,
            result.synced,
            result
                .reason
                .as_deref()
                .map(|r| format!(", reason: {}", r))
                .unwrap_or_default()
        );
        Ok(())
    }
}

impl ScheduledTask for QualitySyncTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(self.tick())
    }
}
