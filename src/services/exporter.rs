//! DataMesh Exporter
//!
//! Periodically snapshots the metrics collector into a buffer and flushes it
//! to the configured backend: object-store JSON-lines, a streaming service,
//! or an HTTP endpoint with a bearer token. A failed flush keeps the buffer
//! for the next tick; shutdown drains whatever is left.

use chrono::{DateTime, Datelike, Timelike, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use utoipa::ToSchema;

use super::metrics_collector::{AGENT_NAME, AGENT_VERSION, MetricsCollector};
use crate::config::MetricsExportConfig;
use crate::utils::ScheduledTask;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExporterStatus {
    pub enabled: bool,
    pub method: String,
    pub last_export: Option<DateTime<Utc>>,
    pub buffer_size: usize,
    pub interval_minutes: u64,
}

pub struct DataMeshExporter {
    collector: Arc<MetricsCollector>,
    config: MetricsExportConfig,
    client: Client,
    buffer: Mutex<Vec<Value>>,
    last_export: RwLock<Option<DateTime<Utc>>>,
    environment: String,
}

impl DataMeshExporter {
    pub fn new(collector: Arc<MetricsCollector>, config: MetricsExportConfig) -> Self {
        let environment =
            std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        Self {
            collector,
            config,
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            buffer: Mutex::new(Vec::new()),
            last_export: RwLock::new(None),
            environment,
        }
    }

    /// Snapshot the collector into the buffer; flush when the batch is full.
    pub async fn collect_and_export(&self) {
        let mut record = json!({
            "event_type": "agent_metrics",
            "agent_name": AGENT_NAME,
            "agent_version": AGENT_VERSION,
            "environment": self.environment,
            "exported_at": Utc::now().to_rfc3339(),
        });

        if let (Value::Object(base), Value::Object(data)) =
            (&mut record, self.collector.export_payload())
        {
            base.extend(data);
        }

        let should_flush = {
            let mut buffer = self
                .buffer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            buffer.push(record);
            buffer.len() >= self.config.batch_size
        };

        if should_flush {
            self.flush().await;
        }
    }

    /// Flush the buffer to the configured backend. On failure the records
    /// stay buffered and the next tick retries.
    pub async fn flush(&self) {
        let batch: Vec<Value> = {
            let buffer = self
                .buffer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if buffer.is_empty() {
                return;
            }
            buffer.clone()
        };

        let result = match self.config.method.as_str() {
            "object_store" => self.flush_to_object_store(&batch).await,
            "stream" => self.flush_to_stream(&batch).await,
            "http" => self.flush_to_http(&batch).await,
            other => Err(format!("unknown export method '{}'", other)),
        };

        match result {
            Ok(()) => {
                let mut buffer = self
                    .buffer
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let drain_len = batch.len().min(buffer.len());
                buffer.drain(..drain_len);
                *self
                    .last_export
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());
                tracing::info!(
                    "Exported {} metric records via {}",
                    batch.len(),
                    self.config.method
                );
            },
            Err(e) => {
                tracing::warn!("Metrics export flush failed (will retry): {}", e);
            },
        }
    }

    /// JSON-lines object keyed by `year=Y/month=M/day=D/metrics_HHMMSS.jsonl`.
    async fn flush_to_object_store(&self, batch: &[Value]) -> Result<(), String> {
        if self.config.object_store_endpoint.is_empty() {
            // No endpoint configured: development sink, log and succeed.
            tracing::debug!("Object-store endpoint not configured; dropping {} records to log",
                batch.len());
            return Ok(());
        }

        let now = Utc::now();
        let key = format!(
            "{}year={}/month={:02}/day={:02}/metrics_{:02}{:02}{:02}.jsonl",
            self.config.object_store_prefix,
            now.year(),
            now.month(),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
        );

        let content: String = batch
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let url = format!(
            "{}/{}/{}",
            self.config.object_store_endpoint.trim_end_matches('/'),
            self.config.object_store_bucket,
            key
        );

        let response = self
            .client
            .put(&url)
            .header("Content-Type", "application/json")
            .body(content)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("object store returned {}", response.status()));
        }
        Ok(())
    }

    async fn flush_to_stream(&self, batch: &[Value]) -> Result<(), String> {
        if self.config.stream_endpoint.is_empty() {
            return Err("stream endpoint not configured".to_string());
        }

        let url = format!(
            "{}/streams/{}/records",
            self.config.stream_endpoint.trim_end_matches('/'),
            self.config.stream_name
        );

        let records: Vec<Value> = batch
            .iter()
            .map(|r| json!({ "data": r, "partition_key": AGENT_NAME }))
            .collect();

        let response = self
            .client
            .post(&url)
            .json(&json!({ "records": records }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("stream service returned {}", response.status()));
        }
        Ok(())
    }

    async fn flush_to_http(&self, batch: &[Value]) -> Result<(), String> {
        if self.config.http_endpoint.is_empty() {
            return Err("http endpoint not configured".to_string());
        }

        let response = self
            .client
            .post(&self.config.http_endpoint)
            .header("Authorization", format!("Bearer {}", self.config.http_api_key))
            .header("Content-Type", "application/json")
            .json(&json!({ "records": batch }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("http sink returned {}", response.status()));
        }
        Ok(())
    }

    /// Force an immediate collect + flush (monitoring endpoint).
    pub async fn export_now(&self) -> ExporterStatus {
        self.collect_and_export().await;
        self.flush().await;
        self.status()
    }

    pub fn status(&self) -> ExporterStatus {
        ExporterStatus {
            enabled: self.config.enabled,
            method: self.config.method.clone(),
            last_export: *self
                .last_export
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            buffer_size: self
                .buffer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .len(),
            interval_minutes: self.config.interval_minutes,
        }
    }
}

impl ScheduledTask for DataMeshExporter {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move {
            self.collect_and_export().await;
            Ok(())
        })
    }

    fn drain(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.flush().await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exporter(batch_size: usize) -> DataMeshExporter {
        let collector = Arc::new(MetricsCollector::new(100));
        let config = MetricsExportConfig { batch_size, ..Default::default() };
        DataMeshExporter::new(collector, config)
    }

    #[tokio::test]
    async fn records_accumulate_until_batch_size() {
        let exporter = exporter(3);

        exporter.collect_and_export().await;
        exporter.collect_and_export().await;
        assert_eq!(exporter.status().buffer_size, 2);

        // Third record reaches the batch size; default object-store sink with
        // no endpoint accepts the flush.
        exporter.collect_and_export().await;
        assert_eq!(exporter.status().buffer_size, 0);
        assert!(exporter.status().last_export.is_some());
    }

    #[tokio::test]
    async fn failed_flush_keeps_the_buffer() {
        let collector = Arc::new(MetricsCollector::new(100));
        let config = MetricsExportConfig {
            method: "http".to_string(),
            http_endpoint: String::new(), // unconfigured → flush fails
            batch_size: 1,
            ..Default::default()
        };
        let exporter = DataMeshExporter::new(collector, config);

        exporter.collect_and_export().await;
        assert_eq!(exporter.status().buffer_size, 1);
        assert!(exporter.status().last_export.is_none());
    }
}
